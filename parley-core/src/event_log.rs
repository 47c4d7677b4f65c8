// ABOUTME: Per-component event log that writes to tracing and buffers log_event records.
// ABOUTME: Buffered records are drained into a stage's output so they travel with its messages.

use crate::message::{LogEvent, LogLevel};

/// Logger identifier: `{id_system}.{id_node}.{component}` when both ids are
/// configured, otherwise `{fallback}.{component}`.
pub fn logger_id(
    id_system: Option<&str>,
    id_node: Option<&str>,
    fallback: &str,
    component: &str,
) -> String {
    match (id_system, id_node) {
        (Some(system), Some(node)) if !system.is_empty() && !node.is_empty() => {
            format!("{}.{}.{}", system, node, component)
        }
        _ => format!("{}.{}", fallback, component),
    }
}

#[derive(Debug)]
pub struct EventLog {
    logger: String,
    buffer: Vec<LogEvent>,
}

impl EventLog {
    pub fn new(logger: impl Into<String>) -> Self {
        Self {
            logger: logger.into(),
            buffer: Vec::new(),
        }
    }

    pub fn logger(&self) -> &str {
        &self.logger
    }

    pub fn debug(&mut self, content: impl Into<String>) {
        self.record(LogLevel::Debug, content.into());
    }

    pub fn info(&mut self, content: impl Into<String>) {
        self.record(LogLevel::Info, content.into());
    }

    pub fn warning(&mut self, content: impl Into<String>) {
        self.record(LogLevel::Warning, content.into());
    }

    pub fn error(&mut self, content: impl Into<String>) {
        self.record(LogLevel::Error, content.into());
    }

    pub fn critical(&mut self, content: impl Into<String>) {
        self.record(LogLevel::Critical, content.into());
    }

    fn record(&mut self, level: LogLevel, content: String) {
        let event = LogEvent::new(level, self.logger.clone(), content);
        event.emit();
        self.buffer.push(event);
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Take every buffered record, oldest first.
    pub fn drain(&mut self) -> Vec<LogEvent> {
        std::mem::take(&mut self.buffer)
    }
}
