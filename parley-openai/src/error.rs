// ABOUTME: Configuration errors raised by the workflow, template and request stages.
// ABOUTME: Any of these aborts the current tick; upstream message construction is at fault.

use crate::builder::BuildError;
use parley_core::utils::FormatError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("Badly formed {stage} message. Could not find type id information.")]
    MissingDiscriminator { stage: &'static str },

    #[error("Did not recognize id_type: {id} ({stage} stage).")]
    UnknownDiscriminator { stage: &'static str, id: String },

    #[error("Badly formed {kind} message. Could not find {field}.")]
    MissingField { kind: String, field: &'static str },

    #[error("Could not find template id: {0}.")]
    UnknownTemplate(String),

    #[error("Template {uid} is malformed: {reason}")]
    MalformedTemplate { uid: String, reason: String },

    #[error("Template {uid}: {source}")]
    Format {
        uid: String,
        #[source]
        source: FormatError,
    },

    #[error("Unknown workflow: {0}")]
    UnknownWorkflow(String),

    #[error("Invalid inline workflow {uid}: {reason}")]
    InvalidWorkflow { uid: String, reason: String },
}
