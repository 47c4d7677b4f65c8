// ABOUTME: Platform-agnostic core of the parley chat relay
// ABOUTME: Message model, bounded relay, event log, configuration and the session reducer

pub mod commands;
pub mod config;
pub mod event_log;
pub mod message;
pub mod orchestrator;
pub mod relay;
pub mod session;
pub mod utils;

pub use event_log::EventLog;
pub use message::{
    AiReply, ApiResult, Attachment, Button, CommandParam, CommandSpec, Kwargs, LogEvent, LogLevel,
    LogMetric, PlatformCommand, PlatformEvent,
};
pub use orchestrator::{Inbound, SessionOrchestrator, Update};
pub use relay::{relay, spawn_worker, Relay, WorkerSide};
