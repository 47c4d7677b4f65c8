// ABOUTME: OpenAI request pipeline: endpoint schemas, request building and API backends.
// ABOUTME: Workflow, template and request stages run colocated or behind a worker relay.

pub mod builder;
pub mod endpoint;
pub mod error;
pub mod pipeline;
pub mod request;
pub mod template;
pub mod traits;
pub mod workflow;

pub mod backends;

pub use backends::http::HttpBackend;
pub use backends::mock::MockBackend;
pub use builder::{build, BuildError, BuiltRequest};
pub use endpoint::Endpoint;
pub use error::PipelineError;
pub use pipeline::Pipeline;
pub use request::{RequestConfig, RequestStage};
pub use template::TemplateStage;
pub use traits::{ApiBackend, ApiError};
pub use workflow::{Workflow, WorkflowRegistry, WorkflowStage};
