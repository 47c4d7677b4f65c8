// ABOUTME: reqwest-based backend for the OpenAI v1 REST API.
// ABOUTME: JSON bodies for text endpoints, multipart uploads for image and audio endpoints.

use crate::endpoint::Endpoint;
use crate::traits::{ApiBackend, ApiError};
use async_trait::async_trait;
use parley_core::Kwargs;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde_json::Value;

pub struct HttpBackend {
    http: Client,
    api_key: String,
    base_url: String,
}

// Custom Debug impl to redact the API key
impl std::fmt::Debug for HttpBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBackend")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl HttpBackend {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, "https://api.openai.com/v1")
    }

    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn url(&self, endpoint: Endpoint) -> String {
        format!("{}{}", self.base_url, endpoint.route())
    }

    async fn form(endpoint: Endpoint, request: &Kwargs) -> Result<Form, ApiError> {
        let mut form = Form::new();
        for (key, value) in request {
            if endpoint.file_fields().contains(&key.as_str()) {
                let path = value.as_str().unwrap_or_default().to_string();
                let bytes = tokio::fs::read(&path).await.map_err(|source| ApiError::File {
                    path: path.clone(),
                    source,
                })?;
                let file_name = std::path::Path::new(&path)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| key.clone());
                form = form.part(key.clone(), Part::bytes(bytes).file_name(file_name));
            } else {
                let text = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                form = form.text(key.clone(), text);
            }
        }
        Ok(form)
    }
}

/// Pull the human-readable message out of an OpenAI error body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.pointer("/error/message").and_then(Value::as_str).map(String::from))
        .unwrap_or_else(|| body.to_string())
}

#[async_trait]
impl ApiBackend for HttpBackend {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn call(&self, endpoint: Endpoint, request: &Kwargs) -> Result<Value, ApiError> {
        let builder = self.http.post(self.url(endpoint)).bearer_auth(&self.api_key);
        let builder = if endpoint.is_multipart() {
            builder.multipart(Self::form(endpoint, request).await?)
        } else {
            builder.json(request)
        };

        let response = builder.send().await?;
        let status = response.status().as_u16();
        if status >= 400 {
            let body = response.text().await.unwrap_or_else(|_| "(no body)".into());
            return Err(ApiError::Status {
                status,
                message: error_message(&body),
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("failed to parse response: {e}")))
    }
}
