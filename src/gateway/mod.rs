// ABOUTME: Gateway client abstraction for the chat platform side of the relay.
// ABOUTME: Defines the GatewayClient trait, its event type and the fatal/transient error split.

pub mod console;
pub mod restart;
pub mod worker;

use async_trait::async_trait;
use parley_core::commands::{CommandFailure, CommandScope};
use parley_core::message::{CommandSpec, PlatformCommand, PlatformEvent};
use std::time::Duration;

/// Which platform command surface a registration targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// Prefix command typed into a chat message (`/name args`).
    Message,
    /// Platform-native application (slash) command.
    Application,
}

/// Something the platform client observed.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Event(PlatformEvent),
    /// The platform could not dispatch a command invocation.
    CommandFailed {
        invocation: PlatformEvent,
        failure: CommandFailure,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Login failure: {0}")]
    LoginFailure(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Gateway not found: {0}")]
    GatewayNotFound(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Privileged intents required: {0}")]
    PrivilegedIntentsRequired(String),

    #[error("Missing application id")]
    MissingApplicationId,

    #[error("Connection lost: {0}")]
    Disconnected(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl GatewayError {
    /// Fatal errors stop the worker; anything else restarts the connection.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::LoginFailure(_)
                | Self::Forbidden(_)
                | Self::GatewayNotFound(_)
                | Self::InvalidData(_)
                | Self::NotFound(_)
                | Self::PrivilegedIntentsRequired(_)
                | Self::MissingApplicationId
        )
    }

    /// Errors that mean the current connection is unusable.
    pub fn is_connection_lost(&self) -> bool {
        self.is_fatal() || matches!(self, Self::Disconnected(_) | Self::Io(_))
    }
}

/// Transport to a chat platform, driven by the gateway worker.
///
/// Implementations must not report messages authored by bots, and must not
/// report messages starting with the command prefix as `msg_*` / `edit_*`
/// events; those arrive as command invocations instead.
#[async_trait]
pub trait GatewayClient: Send {
    /// Log in and open the event stream.
    async fn connect(&mut self, token: &str) -> Result<(), GatewayError>;

    /// Wait up to `timeout` for the next event.
    async fn poll_event(&mut self, timeout: Duration) -> Result<Option<ClientEvent>, GatewayError>;

    async fn register_command(&mut self, kind: CommandKind, spec: &CommandSpec) -> Result<(), GatewayError>;

    /// Deliver a `msg_dm` or `msg_guild` command.
    async fn send(&mut self, message: &PlatformCommand) -> Result<(), GatewayError>;

    async fn is_owner(&mut self, id_user: u64) -> Result<bool, GatewayError>;

    /// Names of registered application commands in `scope`.
    async fn commands(&mut self, scope: CommandScope, id_guild: Option<u64>) -> Result<Vec<String>, GatewayError>;

    async fn sync_commands(&mut self, scope: CommandScope, id_guild: Option<u64>) -> Result<(), GatewayError>;

    /// Ids of the newest `limit` messages in a channel, newest first.
    async fn history(&mut self, id_channel: u64, limit: usize) -> Result<Vec<u64>, GatewayError>;

    async fn delete_message(&mut self, id_channel: u64, id_msg: u64) -> Result<(), GatewayError>;
}

/// Reply addressed to wherever `invocation` came from.
pub fn reply_to(invocation: &PlatformEvent, content: impl Into<String>) -> Option<PlatformCommand> {
    match invocation {
        PlatformEvent::MsgcmdDm { id_author, .. } | PlatformEvent::MsgDm { id_author, .. } => {
            Some(PlatformCommand::dm(*id_author, content))
        }
        PlatformEvent::AppcmdDm { id_user, .. } => Some(PlatformCommand::dm(*id_user, content)),
        PlatformEvent::Msgcmd { id_channel, .. }
        | PlatformEvent::AppcmdGuild { id_channel, .. }
        | PlatformEvent::MsgGuild { id_channel, .. } => Some(PlatformCommand::guild(*id_channel, content)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(GatewayError::LoginFailure("bad token".into()).is_fatal());
        assert!(GatewayError::MissingApplicationId.is_fatal());
        assert!(!GatewayError::Disconnected("reset".into()).is_fatal());
        assert!(!GatewayError::Http("502".into()).is_fatal());
        assert!(GatewayError::Disconnected("reset".into()).is_connection_lost());
        assert!(!GatewayError::Http("502".into()).is_connection_lost());
    }

    #[test]
    fn test_reply_follows_origin() {
        let dm = PlatformEvent::MsgcmdDm {
            name_command: "x".into(),
            args: vec![],
            id_channel: 9,
            id_author: 7,
            name_author: "ada".into(),
        };
        assert_eq!(reply_to(&dm, "hi"), Some(PlatformCommand::dm(7, "hi")));

        let btn = PlatformEvent::Btn {
            id_btn: "join_x".into(),
            id_user: 1,
            name_user: "ada".into(),
            id_channel: 2,
        };
        assert_eq!(reply_to(&btn, "hi"), None);
    }
}
