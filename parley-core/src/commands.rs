// ABOUTME: Command configuration validation, owner maintenance commands and invocation parsing.
// ABOUTME: Decides which command failures are shown verbatim to platform users.

use crate::message::CommandSpec;
use regex::Regex;
use std::sync::LazyLock;

/// Prefix that marks a chat message as a command invocation.
pub const PREFIX_COMMAND: &str = "/";

/// Parameter types a configured command may declare.
pub const PARAM_TYPES: &[&str] = &["str", "int", "float", "bool"];

/// Commands handled inside the gateway worker; never forwarded.
pub const OWNER_COMMANDS: &[&str] = &[
    "bot_sync_commands",
    "bot_show_commands",
    "bot_delete_all_messages",
];

/// Default number of messages removed by `bot_delete_all_messages`.
pub const DEFAULT_DELETE_LIMIT: usize = 100;

const MAX_NAME_LEN: usize = 32;

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("hardcoded regex"));

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandConfigError {
    #[error("command configuration is missing required field '{0}'")]
    MissingField(&'static str),

    #[error("'{0}' is not a valid command or parameter name")]
    InvalidName(String),

    #[error("parameter '{name}' has unsupported type '{kind}'")]
    InvalidType { name: String, kind: String },

    #[error("duplicate parameter '{0}'")]
    DuplicateParam(String),

    #[error("command '{0}' is reserved for the bot owner")]
    Reserved(String),
}

fn check_name(name: &str) -> Result<(), CommandConfigError> {
    if name.len() > MAX_NAME_LEN || !IDENTIFIER.is_match(name) {
        return Err(CommandConfigError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Validate a command registration before it reaches the platform.
pub fn validate_command(spec: &CommandSpec) -> Result<(), CommandConfigError> {
    if spec.name.trim().is_empty() {
        return Err(CommandConfigError::MissingField("name"));
    }
    if spec.description.trim().is_empty() {
        return Err(CommandConfigError::MissingField("description"));
    }
    check_name(&spec.name)?;
    if OWNER_COMMANDS.contains(&spec.name.as_str()) {
        return Err(CommandConfigError::Reserved(spec.name.clone()));
    }

    let mut seen = std::collections::HashSet::new();
    for param in &spec.param {
        check_name(&param.name)?;
        if !PARAM_TYPES.contains(&param.kind.as_str()) {
            return Err(CommandConfigError::InvalidType {
                name: param.name.clone(),
                kind: param.kind.clone(),
            });
        }
        if !seen.insert(param.name.as_str()) {
            return Err(CommandConfigError::DuplicateParam(param.name.clone()));
        }
    }
    Ok(())
}

/// Where registered commands live on the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandScope {
    Global,
    Guild,
}

impl CommandScope {
    pub fn parse(arg: Option<&str>) -> Option<Self> {
        match arg.unwrap_or("global") {
            "global" => Some(Self::Global),
            "guild" => Some(Self::Guild),
            _ => None,
        }
    }
}

/// Maintenance command reserved for the bot owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnerCommand {
    SyncCommands(CommandScope),
    ShowCommands(CommandScope),
    DeleteAllMessages { limit: usize },
}

impl OwnerCommand {
    /// Recognise an owner command. `Some(Err(..))` means the name matched but
    /// the arguments did not.
    pub fn parse(name: &str, args: &[String]) -> Option<Result<Self, String>> {
        let first = args.first().map(|s| s.as_str());
        match name {
            "bot_sync_commands" => Some(
                CommandScope::parse(first)
                    .map(Self::SyncCommands)
                    .ok_or_else(|| format!("Unknown scope: {}", first.unwrap_or_default())),
            ),
            "bot_show_commands" => Some(
                CommandScope::parse(first)
                    .map(Self::ShowCommands)
                    .ok_or_else(|| format!("Unknown scope: {}", first.unwrap_or_default())),
            ),
            "bot_delete_all_messages" => Some(match first {
                None => Ok(Self::DeleteAllMessages {
                    limit: DEFAULT_DELETE_LIMIT,
                }),
                Some(raw) => raw
                    .parse()
                    .map(|limit| Self::DeleteAllMessages { limit })
                    .map_err(|_| format!("Invalid limit: {}", raw)),
            }),
            _ => None,
        }
    }
}

/// Failure raised while the platform dispatched a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandFailure {
    NotFound(String),
    Disabled(String),
    NotOwner,
    BadArgument(String),
    Other(String),
}

impl CommandFailure {
    /// Reply shown to the invoking user.
    ///
    /// Only unknown and disabled commands are echoed; everything else is
    /// logged and answered generically.
    pub fn user_reply(&self) -> String {
        match self {
            Self::NotFound(text) | Self::Disabled(text) => text.clone(),
            Self::NotOwner | Self::BadArgument(_) | Self::Other(_) => {
                "An error has been logged.".to_string()
            }
        }
    }
}

impl std::fmt::Display for CommandFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(text) | Self::Disabled(text) => write!(f, "{}", text),
            Self::NotOwner => write!(f, "command restricted to the bot owner"),
            Self::BadArgument(text) => write!(f, "bad argument: {}", text),
            Self::Other(text) => write!(f, "{}", text),
        }
    }
}

/// Split an argument string, keeping quoted sections together.
pub fn parse_args(input: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut quote_char = '"';

    for c in input.chars() {
        match c {
            '"' | '\'' if !in_quotes => {
                in_quotes = true;
                quote_char = c;
            }
            c if c == quote_char && in_quotes => {
                in_quotes = false;
                if !current.is_empty() {
                    args.push(std::mem::take(&mut current));
                }
            }
            ' ' | '\t' if !in_quotes => {
                if !current.is_empty() {
                    args.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(c),
        }
    }

    if !current.is_empty() {
        args.push(current);
    }
    args
}

/// Parse `/name arg "quoted arg"` into a command name and its arguments.
///
/// Returns `None` when `body` is not a command invocation.
pub fn parse_invocation(body: &str) -> Option<(String, Vec<String>)> {
    let rest = body.trim().strip_prefix(PREFIX_COMMAND)?;
    if !rest.chars().next().is_some_and(|c| c.is_alphabetic() || c == '_') {
        return None;
    }
    let mut parts = rest.splitn(2, char::is_whitespace);
    let name = parts.next()?.to_string();
    let args = parse_args(parts.next().unwrap_or("").trim());
    Some((name, args))
}
