// ABOUTME: Message types exchanged between the gateway worker, the control loop and the AI stages.
// ABOUTME: Platform lanes are typed enums; AI request messages stay open-ended JSON objects.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Open-ended keyword mapping used for raw and resolved API requests.
pub type Kwargs = Map<String, Value>;

/// Current wall-clock time as fractional unix seconds.
pub fn now_secs() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Severity carried by a `log_event` record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

/// Structured log record travelling through the message lanes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    pub level: LogLevel,
    pub logger: String,
    pub content: String,
    pub created: f64,
}

impl LogEvent {
    pub fn new(level: LogLevel, logger: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            level,
            logger: logger.into(),
            content: content.into(),
            created: now_secs(),
        }
    }

    /// Replay this record into the process-wide tracing subscriber.
    pub fn emit(&self) {
        let logger = self.logger.as_str();
        let content = self.content.as_str();
        match self.level {
            LogLevel::Debug => tracing::debug!(logger, "{}", content),
            LogLevel::Info => tracing::info!(logger, "{}", content),
            LogLevel::Warning => tracing::warn!(logger, "{}", content),
            LogLevel::Error | LogLevel::Critical => tracing::error!(logger, "{}", content),
        }
    }
}

/// Numeric measurement, e.g. the token total of one API call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogMetric {
    pub created: f64,
    pub id: String,
    pub value: u64,
}

/// A single interactive button rendered under a delivered message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub label: String,
    pub id_btn: String,
}

impl Button {
    pub fn new(label: impl Into<String>, id_btn: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            id_btn: id_btn.into(),
        }
    }
}

/// File attached to a delivered message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    #[serde(default)]
    pub spoiler: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub buffer: Vec<u8>,
}

/// Parameter of a dynamically registered command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandParam {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl CommandParam {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
        }
    }
}

/// Configuration for a message command or application command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub param: Vec<CommandParam>,
}

/// Event produced by the gateway worker for the control loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlatformEvent {
    MsgDm {
        id_msg: u64,
        id_author: u64,
        name_author: String,
        content: String,
    },
    MsgGuild {
        id_msg: u64,
        id_author: u64,
        name_author: String,
        id_channel: u64,
        name_channel: String,
        content: String,
    },
    EditDm {
        id_prev: u64,
        id_msg: u64,
        id_author: u64,
        name_author: String,
        content: String,
    },
    EditGuild {
        id_prev: u64,
        id_msg: u64,
        id_author: u64,
        name_author: String,
        #[serde(default)]
        nick_author: Option<String>,
        id_channel: u64,
        name_channel: String,
        content: String,
    },
    MsgcmdDm {
        name_command: String,
        #[serde(default)]
        args: Vec<String>,
        id_channel: u64,
        id_author: u64,
        name_author: String,
    },
    Msgcmd {
        id_guild: u64,
        name_guild: String,
        name_channel: String,
        #[serde(default)]
        nick_author: Option<String>,
        name_command: String,
        #[serde(default)]
        args: Vec<String>,
        id_channel: u64,
        id_author: u64,
        name_author: String,
    },
    AppcmdDm {
        name_command: String,
        #[serde(default)]
        args: Vec<String>,
        id_channel: u64,
        id_user: u64,
        name_user: String,
    },
    AppcmdGuild {
        id_guild: u64,
        name_guild: String,
        name_channel: String,
        #[serde(default)]
        nick_user: Option<String>,
        name_command: String,
        #[serde(default)]
        args: Vec<String>,
        id_channel: u64,
        id_user: u64,
        name_user: String,
    },
    Btn {
        id_btn: String,
        id_user: u64,
        name_user: String,
        id_channel: u64,
    },
    /// The worker (re)established its gateway connection.
    Ready { attempt: u32 },
    LogEvent(LogEvent),
    LogMetric(LogMetric),
}

impl PlatformEvent {
    /// Discriminator string, as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MsgDm { .. } => "msg_dm",
            Self::MsgGuild { .. } => "msg_guild",
            Self::EditDm { .. } => "edit_dm",
            Self::EditGuild { .. } => "edit_guild",
            Self::MsgcmdDm { .. } => "msgcmd_dm",
            Self::Msgcmd { .. } => "msgcmd",
            Self::AppcmdDm { .. } => "appcmd_dm",
            Self::AppcmdGuild { .. } => "appcmd_guild",
            Self::Btn { .. } => "btn",
            Self::Ready { .. } => "ready",
            Self::LogEvent(_) => "log_event",
            Self::LogMetric(_) => "log_metric",
        }
    }
}

/// Instruction sent from the control loop to the gateway worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlatformCommand {
    CfgMsgcmd(CommandSpec),
    CfgAppcmd(CommandSpec),
    MsgDm {
        id_user: u64,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file: Option<Attachment>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        button: Option<Button>,
    },
    MsgGuild {
        id_channel: u64,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file: Option<Attachment>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        button: Option<Button>,
    },
}

impl PlatformCommand {
    /// Plain text direct message.
    pub fn dm(id_user: u64, content: impl Into<String>) -> Self {
        Self::MsgDm {
            id_user,
            content: content.into(),
            file: None,
            button: None,
        }
    }

    /// Plain text channel message.
    pub fn guild(id_channel: u64, content: impl Into<String>) -> Self {
        Self::MsgGuild {
            id_channel,
            content: content.into(),
            file: None,
            button: None,
        }
    }

    /// Attach a button to a delivery. Registrations are returned unchanged.
    pub fn with_button(mut self, btn: Button) -> Self {
        match &mut self {
            Self::MsgDm { button, .. } | Self::MsgGuild { button, .. } => *button = Some(btn),
            Self::CfgMsgcmd(_) | Self::CfgAppcmd(_) => {}
        }
        self
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::CfgMsgcmd(_) => "cfg_msgcmd",
            Self::CfgAppcmd(_) => "cfg_appcmd",
            Self::MsgDm { .. } => "msg_dm",
            Self::MsgGuild { .. } => "msg_guild",
        }
    }
}

/// Outcome of one API call. Failure is carried as data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResult {
    pub request: Kwargs,
    pub response: Option<Value>,
    pub error: Option<String>,
    pub state: Value,
}

/// Record produced by the AI stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AiReply {
    OpenaiResult(ApiResult),
    LogMetric(LogMetric),
    LogEvent(LogEvent),
}

/// Messages that can carry a synthetic log record produced by a relay.
pub trait FromLogEvent {
    fn from_log_event(event: LogEvent) -> Self;
}

impl FromLogEvent for PlatformEvent {
    fn from_log_event(event: LogEvent) -> Self {
        Self::LogEvent(event)
    }
}

impl FromLogEvent for AiReply {
    fn from_log_event(event: LogEvent) -> Self {
        Self::LogEvent(event)
    }
}

impl FromLogEvent for LogEvent {
    fn from_log_event(event: LogEvent) -> Self {
        event
    }
}
