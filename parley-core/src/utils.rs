// ABOUTME: Named placeholder substitution for prompt templates.
// ABOUTME: Supports `{name}` fields and `{{` / `}}` brace escapes.

use crate::message::Kwargs;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

static FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{|\}\}|\{([^{}]*)\}|[{}]").expect("hardcoded regex"));

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    #[error("template references unknown argument '{0}'")]
    MissingArgument(String),

    #[error("template has an empty or positional field '{{{0}}}'")]
    UnnamedField(String),

    #[error("template has an unbalanced '{0}'")]
    UnbalancedBrace(char),

    #[error("template field '{name}' uses unsupported format spec '{spec}'")]
    UnsupportedSpec { name: String, spec: String },
}

/// Substitute every `{name}` in `template` with the matching argument.
///
/// Strings are inserted verbatim; any other JSON value is rendered as JSON.
pub fn format_template(template: &str, args: &Kwargs) -> Result<String, FormatError> {
    let mut out = String::with_capacity(template.len());
    let mut last = 0;

    for caps in FIELD.captures_iter(template) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        out.push_str(&template[last..whole.start()]);
        last = whole.end();

        match whole.as_str() {
            "{{" => out.push('{'),
            "}}" => out.push('}'),
            "{" => return Err(FormatError::UnbalancedBrace('{')),
            "}" => return Err(FormatError::UnbalancedBrace('}')),
            _ => {
                let field = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
                // Conversions (`!r`) and format specs (`:>10`) are not rendered.
                if let Some(at) = field.find([':', '!']) {
                    return Err(FormatError::UnsupportedSpec {
                        name: field[..at].trim().to_string(),
                        spec: field[at..].to_string(),
                    });
                }
                let name = field.trim();
                if name.is_empty() || name.chars().all(|c| c.is_ascii_digit()) {
                    return Err(FormatError::UnnamedField(name.to_string()));
                }
                match args.get(name) {
                    Some(Value::String(s)) => out.push_str(s),
                    Some(other) => out.push_str(&other.to_string()),
                    None => return Err(FormatError::MissingArgument(name.to_string())),
                }
            }
        }
    }

    out.push_str(&template[last..]);
    Ok(out)
}

/// Strip ASCII punctuation, e.g. `gpt-3.5-turbo` becomes `gpt35turbo`.
pub fn strip_punctuation(text: &str) -> String {
    text.chars().filter(|c| !c.is_ascii_punctuation()).collect()
}
