//! Generic HTTP provider: one reqwest client driven by a vendor adapter.
//!
//! All network I/O for every backend lives here. The adapter decides the
//! endpoint, the auth header, the request body and how to read responses.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use serde_json::Value;
use tracing::{debug, error, warn};

use mycoder_core::error::ProviderError;
use mycoder_core::schema::ProviderKind;
use mycoder_core::types::{LlmResponse, Message};

use crate::adapter::{invalid_response, AuthScheme, ProviderAdapter};
use crate::traits::{LlmProvider, LlmRequestConfig};

/// Per-request HTTP timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

// ─────────────────────────────────────────────
// HttpProvider
// ─────────────────────────────────────────────

/// An LLM provider speaking the wire format of adapter `A`.
pub struct HttpProvider<A: ProviderAdapter> {
    /// HTTP client (shared, connection-pooled).
    client: reqwest::Client,
    /// API base URL (e.g. `"https://api.openai.com/v1"`).
    api_base: String,
    api_key: String,
    model: String,
    context_window: usize,
    adapter: A,
}

impl<A: ProviderAdapter> std::fmt::Debug for HttpProvider<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProvider")
            .field("provider", &self.adapter.name())
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .finish()
    }
}

impl<A: ProviderAdapter> HttpProvider<A> {
    pub fn new(
        adapter: A,
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        context_window: usize,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to default HTTP client");
                reqwest::Client::new()
            });

        HttpProvider {
            client,
            api_base: api_base.into(),
            api_key: api_key.into(),
            model: model.into(),
            context_window,
            adapter,
        }
    }

    /// Full endpoint URL.
    fn url(&self) -> String {
        let base = self.api_base.trim_end_matches('/');
        format!("{}{}", base, self.adapter.endpoint())
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if !self.api_key.is_empty() {
            let (name, value) = match self.adapter.auth() {
                AuthScheme::Bearer => ("authorization", format!("Bearer {}", self.api_key)),
                AuthScheme::Header(name) => (name, self.api_key.clone()),
            };
            match HeaderValue::from_str(&value) {
                Ok(v) => {
                    headers.insert(HeaderName::from_static(name), v);
                }
                Err(_) => warn!(provider = self.adapter.name(), "API key is not a valid header value"),
            }
        }
        for (name, value) in self.adapter.extra_headers() {
            headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
        }
        headers
    }

    fn transport_error(&self, e: reqwest::Error) -> ProviderError {
        ProviderError::Transport {
            provider: self.adapter.name().to_string(),
            message: e.to_string(),
        }
    }
}

/// Parse a `retry-after` header given in (possibly fractional) seconds.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let secs: f64 = headers.get(RETRY_AFTER)?.to_str().ok()?.trim().parse().ok()?;
    (secs.is_finite() && secs >= 0.0).then(|| Duration::from_secs_f64(secs))
}

#[async_trait]
impl<A: ProviderAdapter> LlmProvider for HttpProvider<A> {
    async fn generate(
        &self,
        messages: &[Message],
        tools: &[Value],
        config: &LlmRequestConfig,
    ) -> Result<LlmResponse, ProviderError> {
        let provider = self.adapter.name();
        debug!(
            provider,
            model = %self.model,
            messages = messages.len(),
            tools = tools.len(),
            "Calling LLM"
        );

        let body = self.adapter.build_request(&self.model, messages, tools, config)?;

        let response = self
            .client
            .post(self.url())
            .headers(self.headers())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(provider, error = %e, "HTTP request failed");
                self.transport_error(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            error!(provider, status = %status, body = %error_text, "API error");
            return Err(self.adapter.classify_error(
                status.as_u16(),
                &error_text,
                retry_after,
                &self.model,
            ));
        }

        let text = response.text().await.map_err(|e| self.transport_error(e))?;
        let value: Value = serde_json::from_str(&text).map_err(|e| {
            error!(provider, error = %e, "Failed to parse LLM response");
            invalid_response(provider, e)
        })?;

        let llm_resp = self.adapter.parse_response(value, tools)?;
        debug!(
            provider,
            tool_calls = llm_resp.message.tool_calls().len(),
            stop_reason = ?llm_resp.stop_reason,
            prompt_tokens = llm_resp.usage.prompt_tokens,
            completion_tokens = llm_resp.usage.completion_tokens,
            "LLM response received"
        );
        Ok(llm_resp)
    }

    fn provider_name(&self) -> &str {
        self.adapter.name()
    }

    fn kind(&self) -> ProviderKind {
        self.adapter.kind()
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn context_window(&self) -> usize {
        self.context_window
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
