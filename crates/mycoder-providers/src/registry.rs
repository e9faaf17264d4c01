//! Provider registry: static specs for the supported LLM backends, the
//! per-model context window table, and the factory that builds a provider
//! from configuration.

use std::sync::Arc;

use anyhow::bail;
use tracing::debug;

use mycoder_core::config::Config;
use mycoder_core::schema::ProviderKind;

use crate::anthropic::AnthropicAdapter;
use crate::http_provider::HttpProvider;
use crate::ollama::OllamaAdapter;
use crate::openai::OpenAiAdapter;
use crate::traits::LlmProvider;

// ─────────────────────────────────────────────
// ProviderSpec: static metadata for one provider
// ─────────────────────────────────────────────

/// Static specification describing one LLM provider.
#[derive(Clone, Debug)]
pub struct ProviderSpec {
    /// Internal name (e.g. `"anthropic"`).
    pub name: &'static str,
    pub kind: ProviderKind,
    /// Human-readable name for logs. E.g. `"Anthropic"`.
    pub display_name: &'static str,
    /// Environment variable conventionally holding the API key.
    pub env_key: &'static str,
    pub default_api_base: &'static str,
    /// Model used when the config leaves `agent.model` empty.
    pub default_model: &'static str,
    /// Context window for models missing from [`MODEL_CONTEXT_WINDOWS`].
    pub default_context_window: usize,
    /// Whether requests fail without an API key.
    pub requires_key: bool,
}

/// Complete list of supported provider specifications.
pub static PROVIDERS: &[ProviderSpec] = &[
    ProviderSpec {
        name: "anthropic",
        kind: ProviderKind::Anthropic,
        display_name: "Anthropic",
        env_key: "ANTHROPIC_API_KEY",
        default_api_base: "https://api.anthropic.com",
        default_model: "claude-3-7-sonnet-latest",
        default_context_window: 200_000,
        requires_key: true,
    },
    ProviderSpec {
        name: "openai",
        kind: ProviderKind::OpenAi,
        display_name: "OpenAI",
        env_key: "OPENAI_API_KEY",
        default_api_base: "https://api.openai.com/v1",
        default_model: "gpt-4o",
        default_context_window: 128_000,
        requires_key: true,
    },
    ProviderSpec {
        name: "ollama",
        kind: ProviderKind::Ollama,
        display_name: "Ollama",
        env_key: "OLLAMA_API_KEY",
        default_api_base: "http://localhost:11434",
        default_model: "llama3.1",
        default_context_window: 8_192,
        requires_key: false,
    },
];

/// Known context windows, matched by model-name prefix (longest first wins).
pub static MODEL_CONTEXT_WINDOWS: &[(&str, usize)] = &[
    ("claude-3", 200_000),
    ("claude-sonnet-4", 200_000),
    ("claude-opus-4", 200_000),
    ("claude-2.1", 200_000),
    ("claude-2", 100_000),
    ("gpt-4o", 128_000),
    ("gpt-4-turbo", 128_000),
    ("gpt-4.1", 1_047_576),
    ("gpt-4", 8_192),
    ("gpt-3.5-turbo", 16_385),
    ("o1", 200_000),
    ("o3", 200_000),
    ("llama3.1", 128_000),
    ("llama3.2", 128_000),
    ("llama3", 8_192),
    ("qwen2.5-coder", 32_768),
    ("mistral", 32_768),
];

/// Find a provider spec by kind.
pub fn find_by_kind(kind: ProviderKind) -> &'static ProviderSpec {
    // Every kind has an entry.
    PROVIDERS
        .iter()
        .find(|s| s.kind == kind)
        .unwrap_or(&PROVIDERS[0])
}

/// Find a provider spec by name.
pub fn find_by_name(name: &str) -> Option<&'static ProviderSpec> {
    PROVIDERS.iter().find(|s| s.name == name)
}

/// Context window for `model`, falling back to the provider default.
pub fn context_window_for(model: &str, spec: &ProviderSpec) -> usize {
    let lower = model.to_lowercase();
    MODEL_CONTEXT_WINDOWS
        .iter()
        .filter(|(prefix, _)| lower.starts_with(prefix))
        .max_by_key(|(prefix, _)| prefix.len())
        .map(|(_, window)| *window)
        .unwrap_or(spec.default_context_window)
}

// ─────────────────────────────────────────────
// Factory
// ─────────────────────────────────────────────

/// Build the configured provider.
///
/// Resolves model (config or provider default), API base (config or
/// default), credentials and context window (config override or table).
pub fn create_provider(config: &Config) -> anyhow::Result<Arc<dyn LlmProvider>> {
    let kind = config.agent.provider;
    let spec = find_by_kind(kind);
    let provider_config = config.providers.get(kind);

    if spec.requires_key && !provider_config.is_configured() {
        bail!(
            "No API key configured for {}. Set {} or providers.{}.apiKey in {}.",
            spec.display_name,
            spec.env_key,
            spec.name,
            mycoder_core::config::get_config_path().display()
        );
    }

    let model = if config.agent.model.is_empty() {
        spec.default_model.to_string()
    } else {
        config.agent.model.clone()
    };
    let api_base = provider_config
        .api_base
        .clone()
        .unwrap_or_else(|| spec.default_api_base.to_string());
    let context_window = config
        .agent
        .context_window
        .unwrap_or_else(|| context_window_for(&model, spec));
    let api_key = provider_config.api_key.clone();

    debug!(
        provider = spec.display_name,
        model = %model,
        api_base = %api_base,
        context_window,
        "Creating LLM provider"
    );

    let provider: Arc<dyn LlmProvider> = match kind {
        ProviderKind::Anthropic => Arc::new(HttpProvider::new(
            AnthropicAdapter,
            api_base,
            api_key,
            model,
            context_window,
        )),
        ProviderKind::OpenAi => Arc::new(HttpProvider::new(
            OpenAiAdapter,
            api_base,
            api_key,
            model,
            context_window,
        )),
        ProviderKind::Ollama => Arc::new(HttpProvider::new(
            OllamaAdapter,
            api_base,
            api_key,
            model,
            context_window,
        )),
    };
    Ok(provider)
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
