//! Scripted provider for tests: replays queued responses and records every
//! request it receives.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use mycoder_core::error::ProviderError;
use mycoder_core::schema::ProviderKind;
use mycoder_core::types::{LlmResponse, Message};

use crate::traits::{LlmProvider, LlmRequestConfig};

/// One recorded `generate` call.
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<Value>,
}

/// A provider that answers from a script.
///
/// When the script runs dry every further call fails with
/// `ProviderError::InvalidResponse`.
pub struct MockProvider {
    name: String,
    kind: ProviderKind,
    context_window: usize,
    delay: Option<Duration>,
    script: Mutex<VecDeque<Result<LlmResponse, ProviderError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockProvider {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            name: format!("mock-{}", kind),
            kind,
            context_window: 128_000,
            delay: None,
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue successful responses in order.
    pub fn with_responses(self, responses: impl IntoIterator<Item = LlmResponse>) -> Self {
        for r in responses {
            self.push(Ok(r));
        }
        self
    }

    pub fn with_context_window(mut self, window: usize) -> Self {
        self.context_window = window;
        self
    }

    /// Sleep before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue one response or error.
    pub fn push(&self, result: Result<LlmResponse, ProviderError>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(result);
        }
    }

    /// All requests received so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    async fn generate(
        &self,
        messages: &[Message],
        tools: &[Value],
        _config: &LlmRequestConfig,
    ) -> Result<LlmResponse, ProviderError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(RecordedRequest {
                messages: messages.to_vec(),
                tools: tools.to_vec(),
            });
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        next.unwrap_or_else(|| {
            Err(ProviderError::InvalidResponse {
                provider: self.name.clone(),
                message: "mock script exhausted".to_string(),
            })
        })
    }

    fn provider_name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn model_name(&self) -> &str {
        "mock-model"
    }

    fn context_window(&self) -> usize {
        self.context_window
    }
}
