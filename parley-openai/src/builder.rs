// ABOUTME: Pure resolution of a raw request against an endpoint schema and defaults.
// ABOUTME: Produces the resolved request, pass-through state and canned test payload.

use crate::endpoint::Endpoint;
use parley_core::Kwargs;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BuildError {
    #[error("Could not determine endpoint.")]
    MissingEndpoint,

    #[error("Unknown endpoint: {0}")]
    UnknownEndpoint(String),

    #[error("{field} not in request or defaults for {endpoint}")]
    MissingField { endpoint: Endpoint, field: &'static str },

    #[error("Type error for request[\"{field}\"]: expected {expected}, got {found}")]
    TypeMismatch {
        field: String,
        expected: String,
        found: Value,
    },
}

/// Output of [`build`].
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltRequest {
    pub endpoint: Endpoint,
    /// Only schema fields, in schema order of resolution.
    pub request: Kwargs,
    /// `raw.state`, verbatim.
    pub state: Value,
    /// Canned payload used in built-in-test mode.
    pub simulated: Value,
}

/// JSON `null` counts as absent.
fn present<'a>(map: &'a Kwargs, key: &str) -> Option<&'a Value> {
    map.get(key).filter(|v| !v.is_null())
}

/// Determine which endpoint a raw request targets.
pub fn resolve_endpoint(raw: &Kwargs, defaults: &Kwargs) -> Result<Endpoint, BuildError> {
    let value = present(raw, "id_endpoint")
        .or_else(|| present(defaults, "id_endpoint"))
        .ok_or(BuildError::MissingEndpoint)?;
    let name = value
        .as_str()
        .ok_or_else(|| BuildError::TypeMismatch {
            field: "id_endpoint".to_string(),
            expected: "str".to_string(),
            found: value.clone(),
        })?;
    name.parse()
        .map_err(BuildError::UnknownEndpoint)
}

/// Resolve `raw` into a fully populated request.
///
/// Each schema field is taken from `raw`, else from `defaults`; a field
/// with neither that is internally or externally required is an error,
/// any other missing field is omitted.
pub fn build(raw: &Kwargs, defaults: &Kwargs) -> Result<BuiltRequest, BuildError> {
    let endpoint = resolve_endpoint(raw, defaults)?;

    let mut request = Kwargs::new();
    for spec in endpoint.fields() {
        let Some(value) = present(raw, spec.name).or_else(|| present(defaults, spec.name)) else {
            if spec.internal || spec.external {
                return Err(BuildError::MissingField {
                    endpoint,
                    field: spec.name,
                });
            }
            continue;
        };

        if !spec.types.iter().any(|t| t.accepts(value)) {
            let expected: Vec<&str> = spec.types.iter().map(|t| t.name()).collect();
            return Err(BuildError::TypeMismatch {
                field: spec.name.to_string(),
                expected: expected.join(" | "),
                found: value.clone(),
            });
        }
        request.insert(spec.name.to_string(), value.clone());
    }

    Ok(BuiltRequest {
        endpoint,
        request,
        state: present(raw, "state")
            .cloned()
            .unwrap_or_else(|| Value::Object(Kwargs::new())),
        simulated: endpoint.simulated_response(),
    })
}
