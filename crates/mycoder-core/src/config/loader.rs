//! Config loader: reads `~/.mycoder/config.json` and merges env vars.
//!
//! # Loading precedence
//! 1. Defaults (from `Config::default()`)
//! 2. JSON file at `~/.mycoder/config.json`
//! 3. Vendor variables `ANTHROPIC_API_KEY`, `OPENAI_API_KEY`, `OLLAMA_BASE_URL`
//! 4. Environment variables `MYCODER_<SECTION>__<FIELD>` (override everything)

use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{debug, info, warn};

use super::schema::{Config, ProviderConfig, SubAgentMode};
use crate::schema::ProviderKind;

/// Default config file path.
pub fn get_config_path() -> PathBuf {
    crate::utils::get_data_path().join("config.json")
}

/// Load configuration from the default path + env vars.
///
/// Falls back to `Config::default()` if the file doesn't exist or can't be parsed.
pub fn load_config(path: Option<&Path>) -> Config {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    apply_env_overrides(load_config_from_path(&config_path))
}

/// Load config from a specific file path, without env overrides.
fn load_config_from_path(path: &Path) -> Config {
    if !path.exists() {
        info!("No config file found at {}, using defaults", path.display());
        return Config::default();
    }

    debug!("Loading config from {}", path.display());

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to read config file {}: {}", path.display(), e);
            return Config::default();
        }
    };

    match serde_json::from_str(&content) {
        Ok(config) => config,
        Err(e) => {
            warn!("Failed to parse config {}: {}", path.display(), e);
            Config::default()
        }
    }
}

/// Save configuration to disk (pretty-printed JSON with camelCase keys).
pub fn save_config(config: &Config, path: Option<&Path>) -> anyhow::Result<()> {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }

    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(&config_path, json)
        .with_context(|| format!("writing {}", config_path.display()))?;
    debug!("Config saved to {}", config_path.display());
    Ok(())
}

/// Apply environment variable overrides on top of a loaded config.
///
/// Env var format: `MYCODER_<SECTION>__<FIELD>` (double underscore as delimiter).
///
/// Supported overrides:
/// - `MYCODER_AGENT__PROVIDER`, `MYCODER_AGENT__MODEL`
/// - `MYCODER_AGENT__MAX_TOKENS`, `MYCODER_AGENT__TEMPERATURE`
/// - `MYCODER_AGENT__MAX_TURNS`, `MYCODER_AGENT__CONTEXT_WINDOW`
/// - `MYCODER_AGENT__PARALLEL_TOOL_CALLS`, `MYCODER_AGENT__SUB_AGENT_MODE`
/// - `MYCODER_AGENT__WORKSPACE`
/// - `MYCODER_PROVIDERS__<NAME>__API_KEY` / `__API_BASE`
/// - `MYCODER_TOOLS__RESTRICT_TO_WORKSPACE`, `MYCODER_TOOLS__USER_PROMPT`
/// - `MYCODER_LOGGING__LEVEL`, `MYCODER_LOGGING__TOKEN_USAGE`
fn apply_env_overrides(mut config: Config) -> Config {
    // Vendor conventions first so MYCODER_* can still win
    if let Ok(val) = std::env::var("ANTHROPIC_API_KEY") {
        config.providers.anthropic.api_key = val;
    }
    if let Ok(val) = std::env::var("OPENAI_API_KEY") {
        config.providers.openai.api_key = val;
    }
    if let Ok(val) = std::env::var("OLLAMA_BASE_URL") {
        config.providers.ollama.api_base = Some(val);
    }

    // Agent
    if let Ok(val) = std::env::var("MYCODER_AGENT__PROVIDER") {
        match val.parse::<ProviderKind>() {
            Ok(kind) => config.agent.provider = kind,
            Err(e) => warn!("Ignoring MYCODER_AGENT__PROVIDER: {}", e),
        }
    }
    if let Ok(val) = std::env::var("MYCODER_AGENT__MODEL") {
        config.agent.model = val;
    }
    if let Some(n) = env_parse("MYCODER_AGENT__MAX_TOKENS") {
        config.agent.max_tokens = n;
    }
    if let Some(t) = env_parse("MYCODER_AGENT__TEMPERATURE") {
        config.agent.temperature = t;
    }
    if let Some(n) = env_parse("MYCODER_AGENT__MAX_TURNS") {
        config.agent.max_turns = n;
    }
    if let Some(n) = env_parse("MYCODER_AGENT__CONTEXT_WINDOW") {
        config.agent.context_window = Some(n);
    }
    if let Some(n) = env_parse("MYCODER_AGENT__PARALLEL_TOOL_CALLS") {
        config.agent.parallel_tool_calls = n;
    }
    if let Ok(val) = std::env::var("MYCODER_AGENT__SUB_AGENT_MODE") {
        match val.to_lowercase().as_str() {
            "disabled" => config.agent.sub_agent_mode = SubAgentMode::Disabled,
            "sync" => config.agent.sub_agent_mode = SubAgentMode::Sync,
            "async" => config.agent.sub_agent_mode = SubAgentMode::Async,
            other => warn!("Ignoring unknown sub-agent mode '{}'", other),
        }
    }
    if let Ok(val) = std::env::var("MYCODER_AGENT__WORKSPACE") {
        config.agent.workspace = val;
    }

    // Providers
    apply_provider_env(&mut config.providers.anthropic, "ANTHROPIC");
    apply_provider_env(&mut config.providers.openai, "OPENAI");
    apply_provider_env(&mut config.providers.ollama, "OLLAMA");

    // Tools
    if let Some(b) = env_bool("MYCODER_TOOLS__RESTRICT_TO_WORKSPACE") {
        config.tools.restrict_to_workspace = b;
    }
    if let Some(b) = env_bool("MYCODER_TOOLS__USER_PROMPT") {
        config.tools.user_prompt = b;
    }

    // Logging
    if let Ok(val) = std::env::var("MYCODER_LOGGING__LEVEL") {
        config.logging.level = val;
    }
    if let Some(b) = env_bool("MYCODER_LOGGING__TOKEN_USAGE") {
        config.logging.token_usage = b;
    }

    config
}

/// Apply env var overrides for a single provider.
fn apply_provider_env(provider: &mut ProviderConfig, name: &str) {
    if let Ok(val) = std::env::var(format!("MYCODER_PROVIDERS__{name}__API_KEY")) {
        provider.api_key = val;
    }
    if let Ok(val) = std::env::var(format!("MYCODER_PROVIDERS__{name}__API_BASE")) {
        provider.api_base = Some(val);
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let val = std::env::var(key).ok()?;
    match val.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("Ignoring {}: cannot parse '{}'", key, val);
            None
        }
    }
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|val| val == "true" || val == "1")
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_temp_json(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_missing_file() {
        let config = load_config_from_path(Path::new("/nonexistent/path/config.json"));
        assert_eq!(config.agent.max_tokens, 4096);
        assert_eq!(config.agent.max_turns, 50);
    }

    #[test]
    fn test_load_valid_json() {
        let file = write_temp_json(
            r#"{
            "agent": {
                "provider": "ollama",
                "model": "llama3.1",
                "maxTokens": 1024
            }
        }"#,
        );

        let config = load_config_from_path(file.path());
        assert_eq!(config.agent.provider, ProviderKind::Ollama);
        assert_eq!(config.agent.model, "llama3.1");
        assert_eq!(config.agent.max_tokens, 1024);
        // Default preserved
        assert_eq!(config.agent.temperature, 0.7);
    }

    #[test]
    fn test_load_invalid_json_returns_defaults() {
        let file = write_temp_json("not valid json {{{");
        let config = load_config_from_path(file.path());
        assert_eq!(config.agent.max_tokens, 4096);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::default();
        config.agent.model = "gpt-4o-mini".to_string();
        config.providers.openai.api_key = "sk-test".to_string();

        save_config(&config, Some(&path)).unwrap();

        let reloaded = load_config_from_path(&path);
        assert_eq!(reloaded.agent.model, "gpt-4o-mini");
        assert_eq!(reloaded.providers.openai.api_key, "sk-test");
    }

    #[test]
    fn test_saved_json_uses_camel_case() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        save_config(&Config::default(), Some(&path)).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let raw: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert!(raw["agent"].get("maxTurns").is_some());
        assert!(raw["agent"].get("max_turns").is_none());
    }

    // Env var tests use distinct keys so they can run in parallel.

    #[test]
    fn test_env_override_model() {
        std::env::set_var("MYCODER_AGENT__MODEL", "test-model");
        let config = apply_env_overrides(Config::default());
        assert_eq!(config.agent.model, "test-model");
        std::env::remove_var("MYCODER_AGENT__MODEL");
    }

    #[test]
    fn test_env_override_provider_key() {
        std::env::set_var("MYCODER_PROVIDERS__OLLAMA__API_KEY", "ollama-env-key");
        let config = apply_env_overrides(Config::default());
        assert_eq!(config.providers.ollama.api_key, "ollama-env-key");
        std::env::remove_var("MYCODER_PROVIDERS__OLLAMA__API_KEY");
    }

    #[test]
    fn test_env_override_max_turns_ignores_garbage() {
        std::env::set_var("MYCODER_AGENT__MAX_TURNS", "many");
        let config = apply_env_overrides(Config::default());
        assert_eq!(config.agent.max_turns, 50);
        std::env::remove_var("MYCODER_AGENT__MAX_TURNS");
    }

    #[test]
    fn test_env_override_sub_agent_mode() {
        std::env::set_var("MYCODER_AGENT__SUB_AGENT_MODE", "Disabled");
        let config = apply_env_overrides(Config::default());
        assert_eq!(config.agent.sub_agent_mode, SubAgentMode::Disabled);
        std::env::remove_var("MYCODER_AGENT__SUB_AGENT_MODE");
    }
}
