// ABOUTME: ApiBackend trait implemented by the HTTP client and the scripted mock.
// ABOUTME: A backend performs exactly one call per resolved request.

use crate::endpoint::Endpoint;
use async_trait::async_trait;
use parley_core::Kwargs;
use serde_json::Value;

/// Failure of a single API call. Surfaced to callers as data, never raised.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Status { status: u16, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("could not read {path}: {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Other(String),
}

/// Something that can answer a resolved request.
#[async_trait]
pub trait ApiBackend: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Perform one call against `endpoint` with the resolved `request`.
    async fn call(&self, endpoint: Endpoint, request: &Kwargs) -> Result<Value, ApiError>;
}
