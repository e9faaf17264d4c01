//! Vendor adapters: pure translation between the neutral model and a wire
//! format.
//!
//! An adapter performs no I/O. [`crate::http_provider::HttpProvider`] owns
//! the HTTP client and asks its adapter to build the request body, parse the
//! response body and classify failures.

use std::time::Duration;

use serde_json::Value;

use mycoder_core::error::ProviderError;
use mycoder_core::schema::ProviderKind;
use mycoder_core::types::{LlmResponse, Message};

use crate::traits::LlmRequestConfig;

/// How the API key is presented.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthScheme {
    /// `Authorization: Bearer <key>`.
    Bearer,
    /// Key sent verbatim in the named header.
    Header(&'static str),
}

/// Translation rules for one vendor.
pub trait ProviderAdapter: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn kind(&self) -> ProviderKind;

    /// Path appended to the API base (e.g. `"/chat/completions"`).
    fn endpoint(&self) -> &'static str;

    fn auth(&self) -> AuthScheme {
        AuthScheme::Bearer
    }

    /// Fixed headers sent with every request.
    fn extra_headers(&self) -> &'static [(&'static str, &'static str)] {
        &[]
    }

    /// Build the JSON request body.
    fn build_request(
        &self,
        model: &str,
        messages: &[Message],
        tools: &[Value],
        config: &LlmRequestConfig,
    ) -> Result<Value, ProviderError>;

    /// Parse a successful response body. `tools` are the definitions that
    /// were offered with the request.
    fn parse_response(&self, body: Value, tools: &[Value]) -> Result<LlmResponse, ProviderError>;

    /// Map a non-success HTTP response to a provider error.
    fn classify_error(
        &self,
        status: u16,
        body: &str,
        retry_after: Option<Duration>,
        model: &str,
    ) -> ProviderError;
}

// ─────────────────────────────────────────────
// Shared classification helpers
// ─────────────────────────────────────────────

/// Pull a human-readable message out of a vendor error body.
///
/// Understands `{"error": {"message": ..}}`, `{"error": ".."}` and
/// `{"message": ..}`; anything else is returned as-is.
pub fn error_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return body.trim().to_string();
    };
    let found = match value.get("error") {
        Some(Value::String(s)) => Some(s.as_str()),
        Some(err) => err.get("message").and_then(Value::as_str),
        None => value.get("message").and_then(Value::as_str),
    };
    found.map(str::to_string).unwrap_or_else(|| body.trim().to_string())
}

/// Text patterns vendors use when the prompt does not fit.
pub fn mentions_context_length(message: &str) -> bool {
    let lower = message.to_lowercase();
    [
        "context length",
        "context_length",
        "context window",
        "prompt is too long",
        "maximum context",
        "too many tokens",
    ]
    .iter()
    .any(|p| lower.contains(p))
}

/// Text patterns vendors use for safety refusals.
pub fn mentions_content_filter(message: &str) -> bool {
    let lower = message.to_lowercase();
    ["content filter", "content_filter", "content policy", "content management policy"]
        .iter()
        .any(|p| lower.contains(p))
}

/// Status-code based classification shared by every adapter.
pub fn classify_status(
    provider: &str,
    status: u16,
    message: String,
    retry_after: Option<Duration>,
    model: &str,
) -> ProviderError {
    let provider = provider.to_string();
    match status {
        401 | 403 => ProviderError::Authentication { provider, message },
        429 => ProviderError::RateLimit {
            provider,
            message,
            retry_after,
        },
        404 => ProviderError::ModelNotFound {
            provider,
            model: model.to_string(),
        },
        _ if mentions_context_length(&message) => ProviderError::ContextLengthExceeded {
            provider,
            message,
            token_count: None,
            max_tokens: None,
        },
        _ if mentions_content_filter(&message) => ProviderError::ContentFilter { provider, message },
        _ => ProviderError::Api {
            provider,
            status: Some(status),
            message,
        },
    }
}

/// Wrap a body that did not match the expected shape.
pub fn invalid_response(provider: &str, err: impl std::fmt::Display) -> ProviderError {
    ProviderError::InvalidResponse {
        provider: provider.to_string(),
        message: err.to_string(),
    }
}
