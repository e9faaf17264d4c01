//! Error types shared across crates.
//!
//! `ProviderError` is the closed set of failures an LLM backend can report.
//! Adapters classify vendor HTTP responses into it, so nothing above the
//! provider layer ever sees a status code or a reqwest type.

use std::time::Duration;

use thiserror::Error;

// ─────────────────────────────────────────────
// Provider errors
// ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    /// Credentials were rejected.
    #[error("[{provider}] authentication failed: {message}")]
    Authentication { provider: String, message: String },

    /// The vendor throttled the request.
    #[error("[{provider}] rate limit exceeded: {message}")]
    RateLimit {
        provider: String,
        message: String,
        retry_after: Option<Duration>,
    },

    /// The request did not fit the model's context window.
    #[error("[{provider}] context length exceeded: {message}")]
    ContextLengthExceeded {
        provider: String,
        message: String,
        token_count: Option<usize>,
        max_tokens: Option<usize>,
    },

    /// The vendor refused the prompt or filtered the output.
    #[error("[{provider}] content filtered: {message}")]
    ContentFilter { provider: String, message: String },

    #[error("[{provider}] model not found: {model}")]
    ModelNotFound { provider: String, model: String },

    /// Any other non-success HTTP status.
    #[error("[{provider}] API error{}: {message}", .status.map(|s| format!(" ({s})")).unwrap_or_default())]
    Api {
        provider: String,
        status: Option<u16>,
        message: String,
    },

    /// Connection, DNS or timeout failure before a response arrived.
    #[error("[{provider}] transport error: {message}")]
    Transport { provider: String, message: String },

    /// A response arrived but could not be understood.
    #[error("[{provider}] invalid response: {message}")]
    InvalidResponse { provider: String, message: String },
}

impl ProviderError {
    /// Name of the provider that produced the error.
    pub fn provider(&self) -> &str {
        match self {
            ProviderError::Authentication { provider, .. }
            | ProviderError::RateLimit { provider, .. }
            | ProviderError::ContextLengthExceeded { provider, .. }
            | ProviderError::ContentFilter { provider, .. }
            | ProviderError::ModelNotFound { provider, .. }
            | ProviderError::Api { provider, .. }
            | ProviderError::Transport { provider, .. }
            | ProviderError::InvalidResponse { provider, .. } => provider,
        }
    }

    /// Whether retrying the same request may succeed.
    ///
    /// Rate limits, server-side (5xx) failures and transport errors qualify.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::RateLimit { .. } | ProviderError::Transport { .. } => true,
            ProviderError::Api { status, .. } => matches!(status, Some(s) if *s >= 500),
            _ => false,
        }
    }

    /// Vendor-suggested wait before retrying, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ProviderError::RateLimit { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    pub fn is_context_length(&self) -> bool {
        matches!(self, ProviderError::ContextLengthExceeded { .. })
    }
}

// ─────────────────────────────────────────────
// Message errors
// ─────────────────────────────────────────────

/// Violations of the conversation's tool-call linkage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    #[error("tool message is missing its tool_call_id")]
    MissingToolCallId,

    #[error("duplicate tool call id '{id}' in one assistant turn")]
    DuplicateToolCallId { id: String },

    #[error("tool result '{id}' does not answer a pending tool call")]
    OrphanToolResult { id: String },

    #[error("tool calls left unanswered: {}", .ids.join(", "))]
    UnansweredToolCalls { ids: Vec<String> },
}
