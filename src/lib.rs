// ABOUTME: Root library: gateway worker, control-loop runtime, logging and metrics setup.
// ABOUTME: Re-exports the core and OpenAI pipeline crates for the binary and tests.

pub mod gateway;
pub mod logging;
pub mod metrics;
pub mod runtime;

pub use parley_core::{commands, config, message, orchestrator, relay, session};
pub use parley_openai::{Pipeline, WorkflowRegistry};
pub use runtime::Runtime;
