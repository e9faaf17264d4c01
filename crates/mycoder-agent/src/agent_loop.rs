//! Agent loop: the LLM ↔ tool-calling main loop.
//!
//! One [`AgentLoop::run`] drives a [`Conversation`] through
//! `AwaitingModel → ModelResponded → {ExecutingTools | Done}` until the model
//! answers without tool calls, the turn budget runs out, or the provider
//! fails for good. Tool failures never end a run; they are fed back to the
//! model as error results.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use mycoder_core::config::Config;
use mycoder_core::error::ProviderError;
use mycoder_core::types::{LlmResponse, Message, Role, ToolCall, Usage};
use mycoder_providers::traits::{LlmProvider, LlmRequestConfig};

use crate::tools::{RegistrationError, ToolManager};

// ─────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────

/// Why a run ended without an answer.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Turn budget exhausted after {turns} turns without a final answer")]
    BudgetExceeded { turns: usize },

    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error("Run cancelled")]
    Cancelled,
}

// ─────────────────────────────────────────────
// Policies & configuration
// ─────────────────────────────────────────────

/// Exponential backoff for retryable provider errors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Never retry.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0-based). A vendor `retry-after`
    /// hint replaces the computed delay; both are capped at `max_backoff`.
    pub fn backoff_for(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        let computed = self
            .initial_backoff
            .saturating_mul(2u32.saturating_pow(attempt));
        hint.unwrap_or(computed).min(self.max_backoff)
    }
}

/// What to do when the history outgrows the context window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TruncationPolicy {
    /// Leave system messages in place and drop the oldest exchanges from the
    /// request view until it fits.
    DropOldest,
}

/// Settings for one [`AgentLoop`].
#[derive(Clone, Debug)]
pub struct LoopConfig {
    /// Provider calls allowed per run.
    pub max_turns: usize,
    /// Tool calls executed concurrently within a turn.
    pub parallel_tool_calls: usize,
    pub tool_timeout: Option<Duration>,
    pub request: LlmRequestConfig,
    pub retry: RetryPolicy,
    pub truncation: Option<TruncationPolicy>,
    /// Log per-turn token usage at info level.
    pub log_token_usage: bool,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_turns: 50,
            parallel_tool_calls: 4,
            tool_timeout: Some(Duration::from_secs(300)),
            request: LlmRequestConfig::default(),
            retry: RetryPolicy::default(),
            truncation: Some(TruncationPolicy::DropOldest),
            log_token_usage: false,
        }
    }
}

impl LoopConfig {
    pub fn from_config(config: &Config) -> Self {
        let agent = &config.agent;
        Self {
            max_turns: agent.max_turns as usize,
            parallel_tool_calls: agent.parallel_tool_calls.max(1),
            tool_timeout: (agent.tool_timeout_secs > 0)
                .then(|| Duration::from_secs(agent.tool_timeout_secs)),
            request: LlmRequestConfig {
                max_tokens: agent.max_tokens,
                temperature: agent.temperature,
            },
            retry: RetryPolicy::default(),
            truncation: agent.truncate_context.then_some(TruncationPolicy::DropOldest),
            log_token_usage: config.logging.token_usage,
        }
    }
}

// ─────────────────────────────────────────────
// Cancellation
// ─────────────────────────────────────────────

/// Cloneable switch that stops a run at its next await point.
#[derive(Clone, Debug)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

// ─────────────────────────────────────────────
// Conversation
// ─────────────────────────────────────────────

/// Message history plus running totals. Owned by whoever drives the loop;
/// any loop (and any provider) can continue it.
#[derive(Clone, Debug, Default)]
pub struct Conversation {
    messages: Vec<Message>,
    usage: Usage,
    turns: usize,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a conversation with a system prompt.
    pub fn with_system(prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(prompt)],
            ..Self::default()
        }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.messages.push(Message::user(text));
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Usage summed over every provider call so far.
    pub fn usage(&self) -> Usage {
        self.usage
    }

    /// Provider calls made so far.
    pub fn turns(&self) -> usize {
        self.turns
    }

    pub fn last_assistant_text(&self) -> Option<String> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role() == Role::Assistant)
            .map(Message::text)
    }

    /// Answer any tool calls of the last assistant message that have no
    /// result yet, so the history stays well-formed after an interruption.
    fn close_pending_calls(&mut self, reason: &str) {
        let Some(pos) = self
            .messages
            .iter()
            .rposition(|m| m.role() == Role::Assistant)
        else {
            return;
        };
        let answered: Vec<String> = self.messages[pos + 1..]
            .iter()
            .filter_map(|m| m.tool_call_id().map(str::to_string))
            .collect();
        let pending: Vec<String> = self.messages[pos]
            .tool_calls()
            .iter()
            .filter(|c| !answered.contains(&c.id))
            .map(|c| c.id.clone())
            .collect();
        for id in pending {
            self.messages.push(Message::tool_error(id, reason));
        }
    }
}

// ─────────────────────────────────────────────
// AgentLoop
// ─────────────────────────────────────────────

/// Where a run currently is.
#[derive(Debug)]
pub enum LoopState {
    AwaitingModel,
    ModelResponded(LlmResponse),
    ExecutingTools(Vec<ToolCall>),
    Done(String),
}

/// Drives conversations against one provider and one tool set.
pub struct AgentLoop {
    provider: Arc<dyn LlmProvider>,
    tools: Arc<ToolManager>,
    config: LoopConfig,
    cancel: Option<CancelToken>,
}

impl AgentLoop {
    pub fn new(provider: Arc<dyn LlmProvider>, tools: Arc<ToolManager>, config: LoopConfig) -> Self {
        info!(
            provider = provider.provider_name(),
            model = provider.model_name(),
            tools = tools.len(),
            max_turns = config.max_turns,
            "agent loop initialized"
        );
        Self {
            provider,
            tools,
            config,
            cancel: None,
        }
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }

    pub fn tools(&self) -> &Arc<ToolManager> {
        &self.tools
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Append `prompt` as a user message and run.
    pub async fn run_prompt(
        &self,
        conversation: &mut Conversation,
        prompt: impl Into<String>,
    ) -> Result<String, AgentError> {
        conversation.push_user(prompt);
        self.run(conversation).await
    }

    /// Run until the model answers without tool calls.
    ///
    /// Returns the final assistant content unchanged.
    pub async fn run(&self, conversation: &mut Conversation) -> Result<String, AgentError> {
        let Some(token) = self.cancel.clone() else {
            return self.drive(conversation).await;
        };
        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => Err(AgentError::Cancelled),
            result = self.drive(conversation) => result,
        };
        if matches!(outcome, Err(AgentError::Cancelled)) {
            info!("agent run cancelled");
            conversation.close_pending_calls("Cancelled before the tool finished");
        }
        outcome
    }

    async fn drive(&self, conversation: &mut Conversation) -> Result<String, AgentError> {
        let mut turns = 0usize;
        let mut state = LoopState::AwaitingModel;

        loop {
            state = match state {
                LoopState::AwaitingModel => {
                    if turns >= self.config.max_turns {
                        warn!(turns, "turn budget exhausted");
                        return Err(AgentError::BudgetExceeded { turns });
                    }
                    turns += 1;
                    debug!(turn = turns, messages = conversation.messages.len(), "LLM call");

                    let response = self.call_model(conversation.messages()).await?;
                    conversation.usage += response.usage;
                    conversation.turns += 1;
                    self.log_usage(turns, &response.usage, &conversation.usage);
                    LoopState::ModelResponded(response)
                }
                LoopState::ModelResponded(response) => {
                    let calls = response.message.tool_calls().to_vec();
                    let content = response.content();
                    conversation.push(response.message);
                    if calls.is_empty() {
                        LoopState::Done(content)
                    } else {
                        LoopState::ExecutingTools(calls)
                    }
                }
                LoopState::ExecutingTools(calls) => {
                    let results = self.execute_tools(&calls).await;
                    for message in results {
                        conversation.push(message);
                    }
                    LoopState::AwaitingModel
                }
                LoopState::Done(content) => {
                    info!(turns, "agent run complete");
                    return Ok(content);
                }
            };
        }
    }

    /// Run every call with bounded concurrency; results come back in the
    /// order the model emitted the calls.
    async fn execute_tools(&self, calls: &[ToolCall]) -> Vec<Message> {
        let limit = self.config.parallel_tool_calls.max(1);
        let timeout = self.config.tool_timeout;
        // Built eagerly so the run future stays `Send`.
        let pending: Vec<_> = calls
            .iter()
            .map(|call| {
                info!(tool = %call.name, call_id = %call.id, "executing tool call");
                self.tools.execute_call(call, timeout)
            })
            .collect();
        stream::iter(pending).buffered(limit).collect().await
    }

    /// One provider call, with context admission, retries and a single
    /// truncation retry for vendor-reported overflows.
    async fn call_model(&self, history: &[Message]) -> Result<LlmResponse, AgentError> {
        let tools = self.tools.schemas_for(self.provider.kind());
        let window = self.provider.context_window();
        let schema_tokens: usize = tools
            .iter()
            .map(|schema| self.provider.count_tokens(&schema.to_string()))
            .sum();
        let mut budget = window
            .saturating_sub(self.config.request.max_tokens as usize)
            .saturating_sub(schema_tokens);
        let mut shrunk = false;
        let mut attempt = 0u32;

        loop {
            let view = self.admit(history, budget)?;
            match self
                .provider
                .generate(&view, &tools, &self.config.request)
                .await
            {
                Ok(response) => return Ok(response),
                Err(e) if e.is_context_length() && self.config.truncation.is_some() && !shrunk => {
                    shrunk = true;
                    // Shrink below what was sent; the local count undershot the vendor's.
                    let sent = self.provider.count_message_tokens(&view);
                    budget = budget.min(sent) * 3 / 4;
                    warn!(error = %e, sent, budget, "provider rejected context, retrying with a smaller view");
                }
                Err(e) if e.is_retryable() && attempt < self.config.retry.max_retries => {
                    let delay = self.config.retry.backoff_for(attempt, e.retry_after());
                    attempt += 1;
                    warn!(
                        error = %e,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "retryable provider error"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!(error = %e, provider = self.provider.provider_name(), "LLM call failed");
                    return Err(e.into());
                }
            }
        }
    }

    /// The slice of `history` that is actually sent, given `budget` tokens.
    fn admit<'a>(&self, history: &'a [Message], budget: usize) -> Result<Cow<'a, [Message]>, ProviderError> {
        let count = self.provider.count_message_tokens(history);
        if count <= budget {
            return Ok(Cow::Borrowed(history));
        }

        let overflow = || ProviderError::ContextLengthExceeded {
            provider: self.provider.provider_name().to_string(),
            message: format!("history needs {count} tokens but only {budget} are available"),
            token_count: Some(count),
            max_tokens: Some(self.provider.context_window()),
        };

        match self.config.truncation {
            Some(TruncationPolicy::DropOldest) => {
                let view = drop_oldest(history, budget, |m| self.provider.count_message_tokens(m))
                    .ok_or_else(overflow)?;
                info!(
                    kept = view.len(),
                    dropped = history.len() - view.len(),
                    budget,
                    "truncated request history"
                );
                Ok(Cow::Owned(view))
            }
            None => Err(overflow()),
        }
    }

    fn log_usage(&self, turn: usize, usage: &Usage, total: &Usage) {
        if self.config.log_token_usage {
            info!(
                turn,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                total_tokens = total.total(),
                "token usage"
            );
        } else {
            debug!(
                turn,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "token usage"
            );
        }
    }
}

/// Keep system messages and the newest exchanges that fit in `budget`.
///
/// The kept tail always starts at a user message, so an assistant tool-call
/// message is never separated from its results and the latest user message
/// is never dropped. `None` when even the smallest view is too large.
fn drop_oldest(
    history: &[Message],
    budget: usize,
    count: impl Fn(&[Message]) -> usize,
) -> Option<Vec<Message>> {
    let (system, rest): (Vec<&Message>, Vec<&Message>) =
        history.iter().partition(|m| m.role() == Role::System);
    let last_user = rest.iter().rposition(|m| m.role() == Role::User)?;

    (0..=last_user)
        .filter(|&start| rest[start].role() == Role::User)
        .map(|start| {
            system
                .iter()
                .chain(rest[start..].iter())
                .map(|m| (*m).clone())
                .collect::<Vec<Message>>()
        })
        .find(|view| count(view) <= budget)
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::FunctionTool;
    use mycoder_core::schema::ProviderKind;
    use mycoder_core::types::validate_history;
    use mycoder_providers::mock::MockProvider;
    use serde_json::{json, Value};

    fn echo_tools() -> Arc<ToolManager> {
        let mut tools = ToolManager::new();
        tools
            .register(Arc::new(
                FunctionTool::builder("echo")
                    .description("Echo the text back")
                    .param("text", "string", "Text to echo", true)
                    .handler(|args| async move {
                        Ok(args.get("text").cloned().unwrap_or(Value::Null))
                    })
                    .build()
                    .unwrap(),
            ))
            .unwrap();
        tools
            .register(Arc::new(
                FunctionTool::builder("wait")
                    .description("Sleep then return the label")
                    .param("label", "string", "Label", true)
                    .param("ms", "integer", "Delay", true)
                    .handler(|args| async move {
                        let ms = args.get("ms").and_then(Value::as_u64).unwrap_or(0);
                        tokio::time::sleep(Duration::from_millis(ms)).await;
                        Ok(args.get("label").cloned().unwrap_or(Value::Null))
                    })
                    .build()
                    .unwrap(),
            ))
            .unwrap();
        Arc::new(tools)
    }

    fn fast_config() -> LoopConfig {
        LoopConfig {
            retry: RetryPolicy {
                max_retries: 2,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(5),
            },
            ..LoopConfig::default()
        }
    }

    fn call(id: &str, name: &str, args: Value) -> ToolCall {
        ToolCall::new(id, name, args)
    }

    #[tokio::test]
    async fn test_plain_answer_is_done() {
        let mock = Arc::new(
            MockProvider::new(ProviderKind::OpenAi)
                .with_responses([LlmResponse::text("Hello!").with_usage(Usage::new(10, 2))]),
        );
        let agent = AgentLoop::new(mock.clone(), echo_tools(), fast_config());
        let mut conv = Conversation::with_system("sys");

        let answer = agent.run_prompt(&mut conv, "Hi").await.unwrap();
        assert_eq!(answer, "Hello!");
        assert_eq!(conv.messages().len(), 3);
        assert_eq!(conv.turns(), 1);
        assert_eq!(conv.usage(), Usage::new(10, 2));
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_echo_scenario() {
        let mock = Arc::new(MockProvider::new(ProviderKind::Anthropic).with_responses([
            LlmResponse::tool_calls("", vec![call("t1", "echo", json!({"text": "ping"}))])
                .with_usage(Usage::new(20, 5)),
            LlmResponse::text("The tool said ping.").with_usage(Usage::new(30, 6)),
        ]));
        let agent = AgentLoop::new(mock.clone(), echo_tools(), fast_config());
        let mut conv = Conversation::new();

        let answer = agent.run_prompt(&mut conv, "Echo ping").await.unwrap();
        assert_eq!(answer, "The tool said ping.");

        let roles: Vec<Role> = conv.messages().iter().map(Message::role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]);
        assert_eq!(conv.messages()[2].tool_call_id(), Some("t1"));
        assert_eq!(conv.messages()[2].text(), "ping");
        assert_eq!(conv.usage(), Usage::new(50, 11));
        validate_history(conv.messages()).unwrap();

        let requests = mock.requests();
        assert_eq!(requests[0].tools.len(), 2);
        assert_eq!(requests[0].tools[0]["name"], "echo");
        assert_eq!(requests[1].messages.len(), 3);
    }

    #[tokio::test]
    async fn test_tool_turn_runs_on_spawned_task() {
        let mock = Arc::new(MockProvider::new(ProviderKind::OpenAi).with_responses([
            LlmResponse::tool_calls("", vec![call("t1", "echo", json!({"text": "ping"}))]),
            LlmResponse::text("pong"),
        ]));
        let agent = AgentLoop::new(mock, echo_tools(), fast_config());

        let handle = tokio::spawn(async move {
            let mut conv = Conversation::new();
            let answer = agent.run_prompt(&mut conv, "Echo ping").await;
            (answer, conv.messages().len())
        });
        let (answer, len) = handle.await.unwrap();
        assert_eq!(answer.unwrap(), "pong");
        assert_eq!(len, 4);
    }

    #[tokio::test]
    async fn test_results_keep_emission_order() {
        let mock = Arc::new(MockProvider::new(ProviderKind::OpenAi).with_responses([
            LlmResponse::tool_calls(
                "",
                vec![
                    call("a", "wait", json!({"label": "A", "ms": 150})),
                    call("b", "wait", json!({"label": "B", "ms": 100})),
                    call("c", "wait", json!({"label": "C", "ms": 0})),
                ],
            ),
            LlmResponse::text("done"),
        ]));
        let agent = AgentLoop::new(mock, echo_tools(), fast_config());
        let mut conv = Conversation::new();

        let started = std::time::Instant::now();
        agent.run_prompt(&mut conv, "go").await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(240));

        let results: Vec<(Option<&str>, String)> = conv
            .messages()
            .iter()
            .filter(|m| m.role() == Role::Tool)
            .map(|m| (m.tool_call_id(), m.text()))
            .collect();
        assert_eq!(
            results,
            vec![
                (Some("a"), "A".to_string()),
                (Some("b"), "B".to_string()),
                (Some("c"), "C".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_budget_exceeded() {
        let responses = (0..5).map(|i| {
            LlmResponse::tool_calls("", vec![call(&format!("t{i}"), "echo", json!({"text": "again"}))])
        });
        let mock = Arc::new(MockProvider::new(ProviderKind::OpenAi).with_responses(responses));
        let config = LoopConfig {
            max_turns: 3,
            ..fast_config()
        };
        let agent = AgentLoop::new(mock.clone(), echo_tools(), config);
        let mut conv = Conversation::new();

        let err = agent.run_prompt(&mut conv, "loop forever").await.unwrap_err();
        assert!(matches!(err, AgentError::BudgetExceeded { turns: 3 }));
        assert_eq!(mock.call_count(), 3);
        validate_history(conv.messages()).unwrap();
    }

    #[tokio::test]
    async fn test_empty_tool_calls_is_done() {
        let mock = Arc::new(
            MockProvider::new(ProviderKind::Ollama)
                .with_responses([LlmResponse::tool_calls("final words", vec![])]),
        );
        let agent = AgentLoop::new(mock.clone(), echo_tools(), fast_config());
        let mut conv = Conversation::new();
        let answer = agent.run_prompt(&mut conv, "hi").await.unwrap();
        assert_eq!(answer, "final words");
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_tool_failure_is_conversational() {
        let mock = Arc::new(MockProvider::new(ProviderKind::OpenAi).with_responses([
            LlmResponse::tool_calls(
                "",
                vec![
                    call("x", "no_such_tool", json!({})),
                    call("y", "echo", json!({"wrong": 1})),
                ],
            ),
            LlmResponse::text("recovered"),
        ]));
        let agent = AgentLoop::new(mock, echo_tools(), fast_config());
        let mut conv = Conversation::new();
        assert_eq!(agent.run_prompt(&mut conv, "go").await.unwrap(), "recovered");
        assert!(conv.messages()[2].text().contains("Unknown tool 'no_such_tool'"));
        assert!(conv.messages()[3].text().contains("Invalid arguments"));
    }

    #[tokio::test]
    async fn test_provider_swap_between_turns() {
        let first = Arc::new(
            MockProvider::new(ProviderKind::OpenAi).with_responses([
                LlmResponse::tool_calls("", vec![call("t1", "echo", json!({"text": "one"}))]),
                LlmResponse::text("first answer"),
            ]),
        );
        let second = Arc::new(
            MockProvider::new(ProviderKind::Anthropic)
                .with_responses([LlmResponse::text("second answer")]),
        );
        let tools = echo_tools();
        let mut conv = Conversation::with_system("sys");

        let a = AgentLoop::new(first, tools.clone(), fast_config());
        assert_eq!(a.run_prompt(&mut conv, "q1").await.unwrap(), "first answer");

        let b = AgentLoop::new(second.clone(), tools, fast_config());
        assert_eq!(b.run_prompt(&mut conv, "q2").await.unwrap(), "second answer");

        let request = &second.requests()[0];
        assert_eq!(request.messages.len(), 6);
        assert_eq!(request.tools[0]["input_schema"]["type"], "object");
        assert_eq!(conv.turns(), 3);
    }

    #[tokio::test]
    async fn test_rate_limit_is_retried() {
        let mock = Arc::new(MockProvider::new(ProviderKind::OpenAi));
        mock.push(Err(ProviderError::RateLimit {
            provider: "mock".into(),
            message: "slow down".into(),
            retry_after: Some(Duration::from_millis(2)),
        }));
        mock.push(Err(ProviderError::Api {
            provider: "mock".into(),
            status: Some(503),
            message: "overloaded".into(),
        }));
        mock.push(Ok(LlmResponse::text("finally")));

        let agent = AgentLoop::new(mock.clone(), echo_tools(), fast_config());
        let mut conv = Conversation::new();
        assert_eq!(agent.run_prompt(&mut conv, "hi").await.unwrap(), "finally");
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_retries_exhausted_and_fatal_errors() {
        let mock = Arc::new(MockProvider::new(ProviderKind::OpenAi));
        for _ in 0..3 {
            mock.push(Err(ProviderError::RateLimit {
                provider: "mock".into(),
                message: "slow down".into(),
                retry_after: None,
            }));
        }
        let agent = AgentLoop::new(mock.clone(), echo_tools(), fast_config());
        let mut conv = Conversation::new();
        let err = agent.run_prompt(&mut conv, "hi").await.unwrap_err();
        assert!(matches!(err, AgentError::Provider(ProviderError::RateLimit { .. })));
        assert_eq!(mock.call_count(), 3);

        let mock = Arc::new(MockProvider::new(ProviderKind::OpenAi));
        mock.push(Err(ProviderError::Authentication {
            provider: "mock".into(),
            message: "bad key".into(),
        }));
        let agent = AgentLoop::new(mock.clone(), echo_tools(), fast_config());
        let err = agent.run_prompt(&mut Conversation::new(), "hi").await.unwrap_err();
        assert!(matches!(err, AgentError::Provider(ProviderError::Authentication { .. })));
        assert_eq!(mock.call_count(), 1);
    }

    fn long_history() -> Conversation {
        let mut conv = Conversation::with_system("You are terse.");
        let filler = "lorem ipsum dolor sit amet ".repeat(40);
        for i in 0..8 {
            conv.push_user(format!("question {i}: {filler}"));
            conv.push(Message::assistant(format!("answer {i}: {filler}")));
        }
        conv.push_user("final question");
        conv
    }

    #[tokio::test]
    async fn test_truncation_drops_oldest_in_request_only() {
        let mock = Arc::new(
            MockProvider::new(ProviderKind::Anthropic)
                .with_context_window(1_500)
                .with_responses([LlmResponse::text("ok")]),
        );
        let config = LoopConfig {
            request: LlmRequestConfig {
                max_tokens: 500,
                temperature: 0.0,
            },
            ..fast_config()
        };
        let agent = AgentLoop::new(mock.clone(), echo_tools(), config);
        let mut conv = long_history();
        let before = conv.messages().len();

        agent.run(&mut conv).await.unwrap();
        assert_eq!(conv.messages().len(), before + 1);

        let sent = &mock.requests()[0].messages;
        assert!(sent.len() < before);
        assert_eq!(sent[0].role(), Role::System);
        assert_eq!(sent[1].role(), Role::User);
        assert_eq!(sent.last().unwrap().text(), "final question");
        assert!(mock.count_message_tokens(sent) <= 1_000);
    }

    #[tokio::test]
    async fn test_overflow_without_policy_fails_before_calling() {
        let mock = Arc::new(MockProvider::new(ProviderKind::OpenAi).with_context_window(1_500));
        let config = LoopConfig {
            truncation: None,
            request: LlmRequestConfig {
                max_tokens: 500,
                temperature: 0.0,
            },
            ..fast_config()
        };
        let agent = AgentLoop::new(mock.clone(), echo_tools(), config);
        let err = agent.run(&mut long_history()).await.unwrap_err();
        assert!(matches!(
            err,
            AgentError::Provider(ProviderError::ContextLengthExceeded { max_tokens: Some(1_500), .. })
        ));
        assert_eq!(mock.call_count(), 0);
    }

    fn vendor_overflow() -> ProviderError {
        ProviderError::ContextLengthExceeded {
            provider: "mock".into(),
            message: "too long".into(),
            token_count: None,
            max_tokens: None,
        }
    }

    /// Fits the local budget easily; only the vendor objects to it.
    fn short_history() -> Conversation {
        let filler = "lorem ipsum dolor sit amet ".repeat(20);
        let mut conv = Conversation::with_system("sys");
        conv.push_user(format!("earlier: {filler}"));
        conv.push(Message::assistant(format!("noted: {filler}")));
        conv.push_user("now");
        conv
    }

    #[tokio::test]
    async fn test_vendor_context_error_gets_one_truncation_retry() {
        let mock = Arc::new(MockProvider::new(ProviderKind::OpenAi));
        mock.push(Err(vendor_overflow()));
        mock.push(Ok(LlmResponse::text("fits now")));
        let agent = AgentLoop::new(mock.clone(), echo_tools(), fast_config());
        let mut conv = short_history();
        let answer = agent.run(&mut conv).await.unwrap();
        assert_eq!(answer, "fits now");
        assert_eq!(mock.call_count(), 2);
        assert_eq!(conv.messages().len(), 5);

        let mock = Arc::new(MockProvider::new(ProviderKind::OpenAi));
        mock.push(Err(vendor_overflow()));
        let config = LoopConfig {
            truncation: None,
            ..fast_config()
        };
        let agent = AgentLoop::new(mock.clone(), echo_tools(), config);
        let err = agent.run(&mut short_history()).await.unwrap_err();
        assert!(matches!(err, AgentError::Provider(ProviderError::ContextLengthExceeded { .. })));
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_truncation_retry_sends_a_smaller_history() {
        let mock = Arc::new(MockProvider::new(ProviderKind::OpenAi));
        mock.push(Err(vendor_overflow()));
        mock.push(Err(vendor_overflow()));
        let agent = AgentLoop::new(mock.clone(), echo_tools(), fast_config());

        let err = agent.run(&mut short_history()).await.unwrap_err();
        assert!(matches!(err, AgentError::Provider(ProviderError::ContextLengthExceeded { .. })));

        let requests = mock.requests();
        assert_eq!(requests.len(), 2);
        assert_ne!(requests[0].messages, requests[1].messages);
        let roles: Vec<Role> = requests[1].messages.iter().map(Message::role).collect();
        assert_eq!(roles, vec![Role::System, Role::User]);
        assert_eq!(requests[1].messages[1].text(), "now");
    }

    #[tokio::test]
    async fn test_vendor_overflow_with_nothing_to_drop_fails_fast() {
        let mock = Arc::new(MockProvider::new(ProviderKind::OpenAi));
        mock.push(Err(vendor_overflow()));
        mock.push(Ok(LlmResponse::text("unreachable")));
        let agent = AgentLoop::new(mock.clone(), echo_tools(), fast_config());
        let err = agent.run_prompt(&mut Conversation::new(), "hi").await.unwrap_err();
        assert!(matches!(err, AgentError::Provider(ProviderError::ContextLengthExceeded { .. })));
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_tool_schemas_count_against_the_window() {
        let tools = echo_tools();
        let counter = MockProvider::new(ProviderKind::OpenAi);
        let schema_tokens: usize = tools
            .schemas_for(ProviderKind::OpenAi)
            .iter()
            .map(|s| counter.count_tokens(&s.to_string()))
            .sum();
        assert!(schema_tokens > 2);

        let history = long_history();
        let history_tokens = counter.count_message_tokens(history.messages());
        let max_tokens = 100;
        // Room for the history and the reply, but not for the tool schemas too.
        let window = history_tokens + max_tokens as usize + schema_tokens / 2;

        let mock = Arc::new(
            MockProvider::new(ProviderKind::OpenAi)
                .with_context_window(window)
                .with_responses([LlmResponse::text("ok")]),
        );
        let config = LoopConfig {
            truncation: None,
            request: LlmRequestConfig {
                max_tokens,
                temperature: 0.0,
            },
            ..fast_config()
        };
        let agent = AgentLoop::new(mock.clone(), tools, config);
        let err = agent.run(&mut long_history()).await.unwrap_err();
        assert!(matches!(err, AgentError::Provider(ProviderError::ContextLengthExceeded { .. })));
        assert_eq!(mock.call_count(), 0);
    }

    #[test]
    fn test_drop_oldest_keeps_tool_exchanges_whole() {
        let history = vec![
            Message::system("sys"),
            Message::user("old"),
            Message::assistant_with_tool_calls("", vec![call("t1", "echo", json!({"text": "x"}))]),
            Message::tool_result("t1", "x"),
            Message::assistant("old answer"),
            Message::user("new"),
            Message::assistant_with_tool_calls("", vec![call("t2", "echo", json!({"text": "y"}))]),
            Message::tool_result("t2", "y"),
        ];
        let view = drop_oldest(&history, 4, |m| m.len()).unwrap();
        let roles: Vec<Role> = view.iter().map(Message::role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant, Role::Tool]);
        assert_eq!(view[1].text(), "new");
        validate_history(&view).unwrap();

        assert!(drop_oldest(&history, 3, |m| m.len()).is_none());
    }

    #[test]
    fn test_backoff() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_for(0, None), Duration::from_secs(1));
        assert_eq!(policy.backoff_for(2, None), Duration::from_secs(4));
        assert_eq!(policy.backoff_for(10, None), Duration::from_secs(30));
        assert_eq!(policy.backoff_for(0, Some(Duration::from_secs(2))), Duration::from_secs(2));
        assert_eq!(policy.backoff_for(0, Some(Duration::from_secs(90))), Duration::from_secs(30));
        assert_eq!(RetryPolicy::none().max_retries, 0);
    }

    #[tokio::test]
    async fn test_cancel_closes_pending_calls() {
        let mut tools = ToolManager::new();
        tools
            .register(Arc::new(
                FunctionTool::builder("hang")
                    .description("Never finishes in time")
                    .handler(|_| async {
                        tokio::time::sleep(Duration::from_secs(30)).await;
                        Ok(Value::Null)
                    })
                    .build()
                    .unwrap(),
            ))
            .unwrap();
        let mock = Arc::new(MockProvider::new(ProviderKind::OpenAi).with_responses([
            LlmResponse::tool_calls("", vec![call("h1", "hang", json!({}))]),
        ]));
        let token = CancelToken::new();
        let agent = AgentLoop::new(mock, Arc::new(tools), fast_config()).with_cancel_token(token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel();
        });
        let mut conv = Conversation::new();
        let err = agent.run_prompt(&mut conv, "go").await.unwrap_err();
        canceller.await.unwrap();

        assert!(matches!(err, AgentError::Cancelled));
        let last = conv.messages().last().unwrap();
        assert_eq!(last.tool_call_id(), Some("h1"));
        validate_history(conv.messages()).unwrap();
    }

    #[test]
    fn test_loop_config_from_config() {
        let mut config = Config::default();
        config.agent.max_turns = 7;
        config.agent.tool_timeout_secs = 0;
        config.agent.truncate_context = false;
        config.logging.token_usage = true;
        let lc = LoopConfig::from_config(&config);
        assert_eq!(lc.max_turns, 7);
        assert_eq!(lc.tool_timeout, None);
        assert_eq!(lc.truncation, None);
        assert!(lc.log_token_usage);
        assert_eq!(lc.request.max_tokens, 4096);
    }
}
