//! LLM Provider trait: the seam between the agent loop and any backend.
//!
//! Every backend (OpenAI, Anthropic, Ollama) implements this trait through
//! [`crate::http_provider::HttpProvider`] paired with a vendor adapter.

use async_trait::async_trait;
use serde_json::Value;

use mycoder_core::error::ProviderError;
use mycoder_core::schema::ProviderKind;
use mycoder_core::types::{LlmResponse, Message};

use crate::tokens;

/// Configuration passed to each LLM call.
#[derive(Clone, Debug)]
pub struct LlmRequestConfig {
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature (0.0 – 1.0).
    pub temperature: f64,
}

impl Default for LlmRequestConfig {
    fn default() -> Self {
        Self {
            max_tokens: 4096,
            temperature: 0.7,
        }
    }
}

/// Trait that all LLM providers must implement.
///
/// Providers hold no conversation state: every call receives the full
/// history, so a conversation can move to another provider between turns.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send one completion request.
    ///
    /// # Arguments
    /// * `messages`: Conversation history in the neutral message model.
    /// * `tools`   : Tool definitions already shaped for [`LlmProvider::kind`].
    /// * `config`  : Temperature, max_tokens.
    async fn generate(
        &self,
        messages: &[Message],
        tools: &[Value],
        config: &LlmRequestConfig,
    ) -> Result<LlmResponse, ProviderError>;

    /// Short provider name used in logs and errors (e.g. `"anthropic"`).
    fn provider_name(&self) -> &str;

    /// Wire family, which decides the tool schema envelope.
    fn kind(&self) -> ProviderKind;

    fn model_name(&self) -> &str;

    /// Context window of the model, in tokens.
    fn context_window(&self) -> usize;

    /// Count tokens in a text string.
    fn count_tokens(&self, text: &str) -> usize {
        tokens::count_tokens(text)
    }

    /// Count tokens for a whole history, including per-message overhead.
    fn count_message_tokens(&self, messages: &[Message]) -> usize {
        tokens::count_message_tokens(messages, |text| self.count_tokens(text))
    }
}
