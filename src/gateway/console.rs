// ABOUTME: Console gateway client: stdin lines become platform events, deliveries go to stdout.
// ABOUTME: Lets the whole relay run locally as a single owner-user DM conversation.

use super::{ClientEvent, CommandKind, GatewayClient, GatewayError};
use async_trait::async_trait;
use parley_core::commands::{parse_invocation, CommandFailure, CommandScope, OWNER_COMMANDS, PREFIX_COMMAND};
use parley_core::message::{CommandSpec, PlatformCommand, PlatformEvent};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

/// Prefix that presses a button by id, e.g. `!join_1a2b3c`.
pub const PREFIX_BUTTON: &str = "!";

pub struct ConsoleClient {
    id_user: u64,
    name_user: String,
    lines: Option<Lines<BufReader<Stdin>>>,
    appcmds: Vec<String>,
    msgcmds: Vec<String>,
    next_msg: u64,
    closed: bool,
}

impl ConsoleClient {
    pub fn new(id_user: u64, name_user: impl Into<String>) -> Self {
        Self {
            id_user,
            name_user: name_user.into(),
            lines: None,
            appcmds: Vec::new(),
            msgcmds: Vec::new(),
            next_msg: 1,
            closed: false,
        }
    }

    /// Translate one input line.
    pub fn parse_line(&mut self, line: &str) -> Option<ClientEvent> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        if let Some(id_btn) = line.strip_prefix(PREFIX_BUTTON) {
            return Some(ClientEvent::Event(PlatformEvent::Btn {
                id_btn: id_btn.trim().to_string(),
                id_user: self.id_user,
                name_user: self.name_user.clone(),
                id_channel: self.id_user,
            }));
        }

        if line.starts_with(PREFIX_COMMAND) {
            let (name_command, args) = parse_invocation(line)?;
            if self.appcmds.contains(&name_command) {
                return Some(ClientEvent::Event(PlatformEvent::AppcmdDm {
                    name_command,
                    args,
                    id_channel: self.id_user,
                    id_user: self.id_user,
                    name_user: self.name_user.clone(),
                }));
            }
            let known = self.msgcmds.contains(&name_command)
                || OWNER_COMMANDS.contains(&name_command.as_str());
            let failure = (!known).then(|| {
                CommandFailure::NotFound(format!("Command \"{}\" is not found", name_command))
            });
            let invocation = PlatformEvent::MsgcmdDm {
                name_command,
                args,
                id_channel: self.id_user,
                id_author: self.id_user,
                name_author: self.name_user.clone(),
            };
            return Some(match failure {
                None => ClientEvent::Event(invocation),
                Some(failure) => ClientEvent::CommandFailed { invocation, failure },
            });
        }

        let id_msg = self.next_msg;
        self.next_msg += 1;
        Some(ClientEvent::Event(PlatformEvent::MsgDm {
            id_msg,
            id_author: self.id_user,
            name_author: self.name_user.clone(),
            content: line.to_string(),
        }))
    }
}

/// Text shown on stdout for one delivery.
pub fn render(message: &PlatformCommand) -> Option<String> {
    let (target, content, file, button) = match message {
        PlatformCommand::MsgDm {
            id_user,
            content,
            file,
            button,
        } => (format!("dm {}", id_user), content, file, button),
        PlatformCommand::MsgGuild {
            id_channel,
            content,
            file,
            button,
        } => (format!("channel {}", id_channel), content, file, button),
        PlatformCommand::CfgMsgcmd(_) | PlatformCommand::CfgAppcmd(_) => return None,
    };

    let mut text = format!("[{}] {}", target, content);
    if let Some(file) = file {
        text.push_str(&format!("\n    (attachment {}, {} bytes)", file.filename, file.buffer.len()));
    }
    if let Some(button) = button {
        text.push_str(&format!("\n    [{}] {}{}", button.label, PREFIX_BUTTON, button.id_btn));
    }
    Some(text)
}

#[async_trait]
impl GatewayClient for ConsoleClient {
    async fn connect(&mut self, _token: &str) -> Result<(), GatewayError> {
        if self.lines.is_none() {
            self.lines = Some(BufReader::new(tokio::io::stdin()).lines());
        }
        Ok(())
    }

    async fn poll_event(&mut self, timeout: Duration) -> Result<Option<ClientEvent>, GatewayError> {
        let lines = match (&mut self.lines, self.closed) {
            (Some(lines), false) => lines,
            _ => {
                tokio::time::sleep(timeout).await;
                return Ok(None);
            }
        };

        let next = tokio::time::timeout(timeout, lines.next_line()).await;
        match next {
            Err(_elapsed) => Ok(None),
            Ok(Ok(Some(line))) => Ok(self.parse_line(&line)),
            Ok(Ok(None)) => {
                tracing::info!("Console input closed");
                self.closed = true;
                Ok(None)
            }
            Ok(Err(e)) => Err(GatewayError::Io(e)),
        }
    }

    async fn register_command(&mut self, kind: CommandKind, spec: &CommandSpec) -> Result<(), GatewayError> {
        let names = match kind {
            CommandKind::Message => &mut self.msgcmds,
            CommandKind::Application => &mut self.appcmds,
        };
        if !names.contains(&spec.name) {
            names.push(spec.name.clone());
        }
        Ok(())
    }

    async fn send(&mut self, message: &PlatformCommand) -> Result<(), GatewayError> {
        if let Some(text) = render(message) {
            println!("{}", text);
        }
        Ok(())
    }

    async fn is_owner(&mut self, id_user: u64) -> Result<bool, GatewayError> {
        Ok(id_user == self.id_user)
    }

    async fn commands(&mut self, _scope: CommandScope, _id_guild: Option<u64>) -> Result<Vec<String>, GatewayError> {
        Ok(self.appcmds.clone())
    }

    async fn sync_commands(&mut self, _scope: CommandScope, _id_guild: Option<u64>) -> Result<(), GatewayError> {
        Ok(())
    }

    async fn history(&mut self, _id_channel: u64, _limit: usize) -> Result<Vec<u64>, GatewayError> {
        Ok(Vec::new())
    }

    async fn delete_message(&mut self, _id_channel: u64, id_msg: u64) -> Result<(), GatewayError> {
        Err(GatewayError::Forbidden(format!("console message {} cannot be deleted", id_msg)))
    }
}
