//! Configuration schema: the typed shape of `~/.mycoder/config.json`.
//!
//! Hierarchy: `Config` → `AgentConfig`, `ProvidersConfig`, `ToolsConfig`,
//! `McpConfig`, `LoggingConfig`.
//!
//! JSON on disk uses **camelCase** keys; Rust uses snake_case.
//! We use `#[serde(rename_all = "camelCase")]` to handle the conversion.

use serde::{Deserialize, Deserializer, Serialize};

use crate::schema::ProviderKind;

// ─────────────────────────────────────────────
// Root Config
// ─────────────────────────────────────────────

/// Root configuration: loaded from `~/.mycoder/config.json` + env vars.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub agent: AgentConfig,
    pub providers: ProvidersConfig,
    pub tools: ToolsConfig,
    pub mcp: McpConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Credentials block for the active provider.
    pub fn active_provider(&self) -> &ProviderConfig {
        self.providers.get(self.agent.provider)
    }
}

// ─────────────────────────────────────────────
// Agent
// ─────────────────────────────────────────────

/// How sub-agents may be spawned.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubAgentMode {
    Disabled,
    Sync,
    #[default]
    Async,
}

/// Agent loop settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentConfig {
    /// LLM backend to talk to.
    pub provider: ProviderKind,
    /// Model identifier; empty means the provider's default model.
    pub model: String,
    /// Maximum tokens to generate per response.
    pub max_tokens: u32,
    /// Sampling temperature (0.0 – 1.0).
    pub temperature: f64,
    /// Turn ceiling for one run before it fails with a budget error.
    pub max_turns: u32,
    /// Manual override of the model's context window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_window: Option<usize>,
    /// Maximum tool calls executed concurrently within a turn.
    pub parallel_tool_calls: usize,
    /// Per-tool-call timeout in seconds (0 disables it).
    pub tool_timeout_secs: u64,
    pub sub_agent_mode: SubAgentMode,
    /// Drop the oldest messages when the history outgrows the window.
    pub truncate_context: bool,
    /// Extra instructions appended to the system prompt.
    #[serde(deserialize_with = "string_or_lines")]
    pub custom_prompt: String,
    /// Working directory for file and shell tools; empty means the cwd.
    pub workspace: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Anthropic,
            model: String::new(),
            max_tokens: 4096,
            temperature: 0.7,
            max_turns: 50,
            context_window: None,
            parallel_tool_calls: 4,
            tool_timeout_secs: 300,
            sub_agent_mode: SubAgentMode::Async,
            truncate_context: true,
            custom_prompt: String::new(),
            workspace: String::new(),
        }
    }
}

/// Accept either a string or a list of lines joined with `\n`.
fn string_or_lines<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Lines {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Lines::deserialize(deserializer)? {
        Lines::One(s) => s,
        Lines::Many(lines) => lines.join("\n"),
    })
}

// ─────────────────────────────────────────────
// Providers
// ─────────────────────────────────────────────

/// Credentials and endpoint for a single LLM provider.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderConfig {
    /// API key for authentication.
    pub api_key: String,
    /// Custom API base URL (overrides provider default).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
}

impl ProviderConfig {
    /// Whether this provider has a configured API key.
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }
}

/// One `ProviderConfig` per supported backend.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProvidersConfig {
    pub anthropic: ProviderConfig,
    pub openai: ProviderConfig,
    pub ollama: ProviderConfig,
}

impl ProvidersConfig {
    pub fn get(&self, kind: ProviderKind) -> &ProviderConfig {
        match kind {
            ProviderKind::Anthropic => &self.anthropic,
            ProviderKind::OpenAi => &self.openai,
            ProviderKind::Ollama => &self.ollama,
        }
    }

    pub fn get_mut(&mut self, kind: ProviderKind) -> &mut ProviderConfig {
        match kind {
            ProviderKind::Anthropic => &mut self.anthropic,
            ProviderKind::OpenAi => &mut self.openai,
            ProviderKind::Ollama => &mut self.ollama,
        }
    }
}

// ─────────────────────────────────────────────
// Tools
// ─────────────────────────────────────────────

/// Built-in tool settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolsConfig {
    /// Confine file tools and the shell's cwd to the workspace.
    pub restrict_to_workspace: bool,
    /// Register the `user_prompt` tool.
    pub user_prompt: bool,
    pub shell: ShellToolConfig,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            restrict_to_workspace: false,
            user_prompt: true,
            shell: ShellToolConfig::default(),
        }
    }
}

/// Shell tool configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ShellToolConfig {
    /// Command timeout in seconds.
    pub timeout: u64,
}

impl Default for ShellToolConfig {
    fn default() -> Self {
        Self { timeout: 60 }
    }
}

// ─────────────────────────────────────────────
// MCP
// ─────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum McpAuthType {
    #[default]
    Bearer,
    Basic,
}

/// Authentication for one MCP server.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct McpServerAuth {
    #[serde(rename = "type")]
    pub auth_type: McpAuthType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// A Model Context Protocol server.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct McpServerConfig {
    pub name: String,
    pub url: String,
    pub auth: McpServerAuth,
}

/// MCP integration settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct McpConfig {
    pub servers: Vec<McpServerConfig>,
    /// Resource URIs fetched into the system prompt at startup.
    pub default_resources: Vec<String>,
    /// Remote tool URIs registered as first-class tools.
    pub default_tools: Vec<String>,
}

// ─────────────────────────────────────────────
// Logging
// ─────────────────────────────────────────────

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingConfig {
    /// Default filter directive (`error`, `warn`, `info`, `debug`, `trace`).
    pub level: String,
    /// Log token usage at info level after every model call.
    pub token_usage: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            token_usage: false,
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
