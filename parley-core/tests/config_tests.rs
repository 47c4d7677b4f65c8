// ABOUTME: Tests for configuration loading and validation
// ABOUTME: Verifies TOML parsing, env var overrides, and required field validation

use parley_core::config::Config;
use serial_test::serial;
use std::io::Write;

/// Helper to clear all config-related env vars
fn clear_config_env_vars() {
    std::env::remove_var("PARLEY_CONFIG_PATH");
    std::env::remove_var("PARLEY_BOT_TOKEN");
    std::env::remove_var("OPENAI_API_KEY");
    std::env::remove_var("PARLEY_ID_SYSTEM");
    std::env::remove_var("PARLEY_ID_NODE");
    std::env::remove_var("PARLEY_LOG_LEVEL");
}

const FULL_CONFIG: &str = r#"
[system]
id_system = "parley"
id_node = "n1"
level_log = "debug"

[bot]
str_token = "file-token"
secs_sleep = 0.25
queue_capacity = 16

[bot.restart]
initial_delay_secs = 1.0
max_restarts = 5

[openai]
api_key = "file-key"
secs_interval = 2.0
is_bit = false
is_async = true

[openai.default]
model = "gpt-3.5-turbo"
temperature = 0.2

[runtime]
secs_tick = 0.5

[prompts]
summary = "Summarise {str_topic}: {str_transcript}"
"#;

fn write_config(dir: &tempfile::TempDir, content: &str) -> std::path::PathBuf {
    let path = dir.path().join("config.toml");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
    path
}

#[test]
#[serial]
fn test_config_loads_from_explicit_path() {
    clear_config_env_vars();
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, FULL_CONFIG);

    let config = Config::load(Some(&path)).unwrap();

    assert_eq!(config.system.id_system.as_deref(), Some("parley"));
    assert_eq!(config.system.level_log, "debug");
    assert_eq!(config.bot.str_token, "file-token");
    assert_eq!(config.bot.queue_capacity, 16);
    assert_eq!(config.bot.restart.max_restarts, 5);
    assert!(config.openai.is_async);
    assert_eq!(config.openai.default["temperature"], 0.2);
    assert_eq!(config.runtime.secs_tick, 0.5);
    assert!(config.prompts.contains_key("summary"));
}

#[test]
#[serial]
fn test_config_path_from_env_var() {
    clear_config_env_vars();
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, FULL_CONFIG);
    std::env::set_var("PARLEY_CONFIG_PATH", path.to_str().unwrap());

    let config = Config::load(None).unwrap();
    assert_eq!(config.system.id_node.as_deref(), Some("n1"));

    clear_config_env_vars();
}

#[test]
#[serial]
fn test_env_var_overrides() {
    clear_config_env_vars();
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, FULL_CONFIG);
    std::env::set_var("PARLEY_BOT_TOKEN", "env-token");
    std::env::set_var("OPENAI_API_KEY", "env-key");
    std::env::set_var("PARLEY_ID_NODE", "n2");
    std::env::set_var("PARLEY_LOG_LEVEL", "warn");

    let config = Config::load(Some(&path)).unwrap();
    assert_eq!(config.bot.str_token, "env-token");
    assert_eq!(config.openai.api_key, "env-key");
    assert_eq!(config.system.id_node.as_deref(), Some("n2"));
    assert_eq!(config.system.level_log, "warn");

    clear_config_env_vars();
}

#[test]
#[serial]
fn test_token_can_come_from_env_only() {
    clear_config_env_vars();
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, &FULL_CONFIG.replace("str_token = \"file-token\"\n", ""));

    assert!(Config::load(Some(&path)).is_err());

    std::env::set_var("PARLEY_BOT_TOKEN", "env-token");
    let config = Config::load(Some(&path)).unwrap();
    assert_eq!(config.bot.str_token, "env-token");

    clear_config_env_vars();
}

#[test]
#[serial]
fn test_missing_required_key_fails_loading() {
    clear_config_env_vars();
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, &FULL_CONFIG.replace("secs_interval = 2.0\n", ""));

    let err = Config::load(Some(&path)).unwrap_err();
    assert!(format!("{:#}", err).contains("secs_interval"));
}

#[test]
#[serial]
fn test_missing_file_fails() {
    clear_config_env_vars();
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.toml");
    assert!(Config::load(Some(&missing)).is_err());
}
