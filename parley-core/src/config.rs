// ABOUTME: Configuration parsing from TOML file with environment variable overrides
// ABOUTME: Required relay and request keys fail loading; secrets are redacted in Debug output
use crate::message::Kwargs;
use crate::relay::MAX_QUEUE_CAPACITY;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub system: SystemConfig,
    pub bot: BotConfig,
    pub openai: OpenaiConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    /// Prompt texts keyed by prompt id, e.g. `summary`.
    #[serde(default)]
    pub prompts: BTreeMap<String, String>,
    /// Workflows primed at start-up.
    #[serde(default)]
    pub workflows: Vec<WorkflowDef>,
}

/// A `[[workflows]]` entry: registry name or inline step script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDef {
    pub uid_workflow: String,
    pub spec: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_node: Option<String>,
    #[serde(default = "default_level_log")]
    pub level_log: String,
    #[serde(default)]
    pub log_json: bool,
    /// Directory for a daily-rolling log file, in addition to stderr.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<String>,
    /// Port for the Prometheus scrape endpoint. Disabled when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics_port: Option<u16>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            id_system: None,
            id_node: None,
            level_log: default_level_log(),
            log_json: false,
            log_file: None,
            metrics_port: None,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default)]
    pub str_token: String,
    /// Seconds the gateway worker waits for inbound events when idle.
    pub secs_sleep: f64,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default)]
    pub restart: RestartConfig,
}

// Custom Debug impl to redact the gateway token
impl std::fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotConfig")
            .field("str_token", &"[REDACTED]")
            .field("secs_sleep", &self.secs_sleep)
            .field("queue_capacity", &self.queue_capacity)
            .field("restart", &self.restart)
            .finish()
    }
}

/// Pacing for gateway reconnects. The defaults restart at once, forever.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestartConfig {
    #[serde(default)]
    pub initial_delay_secs: f64,
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: f64,
    #[serde(default = "default_multiplier")]
    pub multiplier: u32,
    /// 0 = unlimited
    #[serde(default)]
    pub max_restarts: u32,
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            initial_delay_secs: 0.0,
            max_delay_secs: default_max_delay_secs(),
            multiplier: default_multiplier(),
            max_restarts: 0,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct OpenaiConfig {
    #[serde(default)]
    pub api_key: String,
    /// Seconds the delegated API worker sleeps when its queue is empty.
    pub secs_interval: f64,
    /// Built-in-test mode: answer with canned payloads, never call the API.
    pub is_bit: bool,
    /// Delegate API calls to a worker thread.
    pub is_async: bool,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Per-field request defaults applied by the request builder.
    pub default: Kwargs,
}

// Custom Debug impl to redact the API key
impl std::fmt::Debug for OpenaiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenaiConfig")
            .field("api_key", &"[REDACTED]")
            .field("secs_interval", &self.secs_interval)
            .field("is_bit", &self.is_bit)
            .field("is_async", &self.is_async)
            .field("base_url", &self.base_url)
            .field("queue_capacity", &self.queue_capacity)
            .field("default", &self.default)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_secs_tick")]
    pub secs_tick: f64,
    #[serde(default = "default_summary_model")]
    pub summary_model: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            secs_tick: default_secs_tick(),
            summary_model: default_summary_model(),
        }
    }
}

fn default_level_log() -> String {
    "info".to_string()
}

fn default_queue_capacity() -> usize {
    1000
}

fn default_max_delay_secs() -> f64 {
    60.0
}

fn default_multiplier() -> u32 {
    2
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

/// Shortest accepted control-loop tick.
pub const MIN_SECS_TICK: f64 = 0.001;

fn default_secs_tick() -> f64 {
    0.1
}

fn default_summary_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn check_secs(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        anyhow::bail!("{} must be a non-negative number of seconds, got: {}", name, value);
    }
    Ok(())
}

impl Config {
    /// Find the config file: explicit path, then PARLEY_CONFIG_PATH, then ./config.toml
    fn find_config_file(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }
        if let Ok(env_path) = std::env::var("PARLEY_CONFIG_PATH") {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Some(path);
            }
        }
        let local_config = PathBuf::from("config.toml");
        if local_config.exists() {
            return Some(local_config);
        }
        None
    }

    /// Load configuration from a TOML file with environment variable overrides
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let config_path = Self::find_config_file(explicit).context(
            "No configuration file found (pass --config, set PARLEY_CONFIG_PATH, or create ./config.toml)",
        )?;
        tracing::info!(path = %config_path.display(), "Loading configuration from file");
        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        let mut config = Self::parse(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse TOML text without env overrides or validation.
    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str::<Config>(content)?)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("PARLEY_BOT_TOKEN") {
            self.bot.str_token = val;
        }
        if let Ok(val) = std::env::var("OPENAI_API_KEY") {
            self.openai.api_key = val;
        }
        if let Ok(val) = std::env::var("PARLEY_ID_SYSTEM") {
            self.system.id_system = Some(val);
        }
        if let Ok(val) = std::env::var("PARLEY_ID_NODE") {
            self.system.id_node = Some(val);
        }
        if let Ok(val) = std::env::var("PARLEY_LOG_LEVEL") {
            self.system.level_log = val;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.bot.str_token.trim().is_empty() {
            anyhow::bail!("bot.str_token is required (set in config file or PARLEY_BOT_TOKEN env var)");
        }
        if self.openai.api_key.trim().is_empty() {
            anyhow::bail!("openai.api_key is required (set in config file or OPENAI_API_KEY env var)");
        }
        check_secs("bot.secs_sleep", self.bot.secs_sleep)?;
        check_secs("openai.secs_interval", self.openai.secs_interval)?;
        check_secs("runtime.secs_tick", self.runtime.secs_tick)?;
        if self.runtime.secs_tick < MIN_SECS_TICK {
            anyhow::bail!(
                "runtime.secs_tick must be at least {} seconds, got: {}",
                MIN_SECS_TICK,
                self.runtime.secs_tick
            );
        }
        check_secs("bot.restart.initial_delay_secs", self.bot.restart.initial_delay_secs)?;
        check_secs("bot.restart.max_delay_secs", self.bot.restart.max_delay_secs)?;
        for (name, capacity) in [
            ("bot.queue_capacity", self.bot.queue_capacity),
            ("openai.queue_capacity", self.openai.queue_capacity),
        ] {
            if capacity == 0 || capacity > MAX_QUEUE_CAPACITY {
                anyhow::bail!(
                    "{} must be between 1 and {}, got: {}",
                    name,
                    MAX_QUEUE_CAPACITY,
                    capacity
                );
            }
        }
        if self.system.level_log.trim().is_empty() {
            anyhow::bail!("system.level_log must not be empty");
        }
        for wf in &self.workflows {
            if wf.uid_workflow.trim().is_empty() || wf.spec.trim().is_empty() {
                anyhow::bail!("workflows entries need both uid_workflow and spec");
            }
        }
        if !self.prompts.contains_key("summary") {
            tracing::warn!("No 'summary' prompt configured; summaries will fail until one is set");
        }
        Ok(())
    }
}
