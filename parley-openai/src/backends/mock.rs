// ABOUTME: Mock backend for testing - returns pre-configured responses.
// ABOUTME: Allows deterministic tests without any network traffic.
//!
//! # Example
//!
//! ```no_run
//! use parley_openai::backends::mock::MockBackend;
//! use parley_openai::endpoint::Endpoint;
//! use serde_json::json;
//!
//! let mock = MockBackend::new()
//!     .on_endpoint(Endpoint::ChatCompletions)
//!     .respond(json!({"choices": [{"message": {"content": "hi"}}]}))
//!     .on_endpoint(Endpoint::Completions)
//!     .respond_error("rate limited");
//! ```

use crate::endpoint::Endpoint;
use crate::traits::{ApiBackend, ApiError};
use async_trait::async_trait;
use parley_core::Kwargs;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Mock backend for testing
///
/// Clones share expectations and the call log, so a test can keep one
/// clone for assertions and hand another to a stage.
#[derive(Clone, Default)]
pub struct MockBackend {
    expectations: Arc<Mutex<VecDeque<Expectation>>>,
    calls: Arc<Mutex<Vec<(Endpoint, Kwargs)>>>,
}

struct Expectation {
    endpoint: Endpoint,
    outcome: Result<Value, String>,
}

impl MockBackend {
    /// Create a new mock backend with no expectations
    pub fn new() -> Self {
        Self::default()
    }

    /// Set up an expectation for the next call to `endpoint`
    pub fn on_endpoint(self, endpoint: Endpoint) -> ExpectationBuilder {
        ExpectationBuilder {
            backend: self,
            endpoint,
        }
    }

    /// Every call made so far, oldest first
    pub fn calls(&self) -> Vec<(Endpoint, Kwargs)> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// Builder for setting up mock expectations with a fluent API
pub struct ExpectationBuilder {
    backend: MockBackend,
    endpoint: Endpoint,
}

impl ExpectationBuilder {
    fn push(self, outcome: Result<Value, String>) -> MockBackend {
        self.backend
            .expectations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Expectation {
                endpoint: self.endpoint,
                outcome,
            });
        self.backend
    }

    /// Respond with a JSON payload
    pub fn respond(self, response: Value) -> MockBackend {
        self.push(Ok(response))
    }

    /// Fail the call with the given message
    pub fn respond_error(self, message: &str) -> MockBackend {
        self.push(Err(message.to_string()))
    }
}

#[async_trait]
impl ApiBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn call(&self, endpoint: Endpoint, request: &Kwargs) -> Result<Value, ApiError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((endpoint, request.clone()));

        // First queued expectation for this endpoint wins
        let outcome = {
            let mut exp = self.expectations.lock().unwrap_or_else(|e| e.into_inner());
            exp.iter()
                .position(|e| e.endpoint == endpoint)
                .and_then(|i| exp.remove(i))
                .map(|e| e.outcome)
        };

        match outcome {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(ApiError::Other(message)),
            None => Err(ApiError::Other(format!(
                "Mock: no expectation for '{}'",
                endpoint
            ))),
        }
    }
}
