//! Anthropic Messages adapter (`POST {base}/v1/messages`).
//!
//! System prompts travel in a top-level `system` field. Assistant tool calls
//! are `tool_use` content blocks and their results are `tool_result` blocks
//! inside a *user* message; consecutive same-role turns are merged because
//! the API expects roles to alternate.
//!
//! Usage: prompt = `input_tokens` + cache creation/read input tokens,
//! completion = `output_tokens`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use mycoder_core::error::ProviderError;
use mycoder_core::schema::ProviderKind;
use mycoder_core::types::{LlmResponse, Message, StopReason, ToolCall, Usage};

use crate::adapter::{
    classify_status, error_message, invalid_response, mentions_context_length, AuthScheme,
    ProviderAdapter,
};
use crate::traits::LlmRequestConfig;

const NAME: &str = "anthropic";
const API_VERSION: &str = "2023-06-01";

// ─────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
}

#[derive(Serialize)]
struct WireMessage {
    role: &'static str,
    content: Vec<Block>,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Block {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
    /// Blocks this adapter does not interpret (e.g. `thinking`).
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<Block>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: WireUsage,
}

#[derive(Deserialize, Default)]
struct WireUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
    #[serde(default)]
    cache_creation_input_tokens: Option<u64>,
    #[serde(default)]
    cache_read_input_tokens: Option<u64>,
}

// ─────────────────────────────────────────────
// Adapter
// ─────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Default)]
pub struct AnthropicAdapter;

/// Split system prompts out and translate the rest into alternating turns.
fn to_wire(messages: &[Message]) -> (Option<String>, Vec<WireMessage>) {
    let mut system: Vec<String> = Vec::new();
    let mut out: Vec<WireMessage> = Vec::new();

    for message in messages {
        let (role, blocks) = match message {
            Message::System { content } => {
                if !content.is_empty() {
                    system.push(content.clone());
                }
                continue;
            }
            Message::User { content } => {
                let text = content.as_text();
                if text.is_empty() {
                    continue;
                }
                ("user", vec![Block::Text { text }])
            }
            Message::Assistant {
                content,
                tool_calls,
            } => {
                let mut blocks = Vec::new();
                // Empty text blocks are rejected by the API.
                if !content.is_empty() {
                    blocks.push(Block::Text {
                        text: content.as_text(),
                    });
                }
                blocks.extend(tool_calls.iter().map(|call| Block::ToolUse {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    input: Value::Object(call.arguments.clone()),
                }));
                if blocks.is_empty() {
                    continue;
                }
                ("assistant", blocks)
            }
            Message::Tool {
                tool_call_id,
                content,
                is_error,
            } => (
                "user",
                vec![Block::ToolResult {
                    tool_use_id: tool_call_id.clone(),
                    content: content.clone(),
                    is_error: *is_error,
                }],
            ),
        };

        match out.last_mut() {
            Some(last) if last.role == role => last.content.extend(blocks),
            _ => out.push(WireMessage {
                role,
                content: blocks,
            }),
        }
    }

    let system = (!system.is_empty()).then(|| system.join("\n\n"));
    (system, out)
}

fn stop_reason(reason: Option<&str>) -> StopReason {
    match reason {
        None | Some("end_turn") | Some("stop_sequence") => StopReason::EndTurn,
        Some("tool_use") => StopReason::ToolUse,
        Some("max_tokens") => StopReason::MaxTokens,
        Some("refusal") => StopReason::ContentFilter,
        Some(other) => StopReason::Other(other.to_string()),
    }
}

impl ProviderAdapter for AnthropicAdapter {
    fn name(&self) -> &'static str {
        NAME
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    fn endpoint(&self) -> &'static str {
        "/v1/messages"
    }

    fn auth(&self) -> AuthScheme {
        AuthScheme::Header("x-api-key")
    }

    fn extra_headers(&self) -> &'static [(&'static str, &'static str)] {
        &[("anthropic-version", API_VERSION)]
    }

    fn build_request(
        &self,
        model: &str,
        messages: &[Message],
        tools: &[Value],
        config: &LlmRequestConfig,
    ) -> Result<Value, ProviderError> {
        let (system, messages) = to_wire(messages);
        let request = MessagesRequest {
            model,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            system,
            messages,
            tools: tools.to_vec(),
        };
        serde_json::to_value(request).map_err(|e| invalid_response(NAME, e))
    }

    fn parse_response(&self, body: Value, _tools: &[Value]) -> Result<LlmResponse, ProviderError> {
        let resp: MessagesResponse =
            serde_json::from_value(body).map_err(|e| invalid_response(NAME, e))?;

        let mut text = String::new();
        let mut tool_calls = Vec::new();
        for block in resp.content {
            match block {
                Block::Text { text: t } => text.push_str(&t),
                Block::ToolUse { id, name, input } => tool_calls.push(ToolCall::new(id, name, input)),
                Block::ToolResult { .. } | Block::Unknown => {}
            }
        }

        let stop = stop_reason(resp.stop_reason.as_deref());
        if stop == StopReason::ContentFilter && text.is_empty() && tool_calls.is_empty() {
            return Err(ProviderError::ContentFilter {
                provider: NAME.to_string(),
                message: "the model declined to respond".to_string(),
            });
        }

        let u = resp.usage;
        let prompt = u.input_tokens
            + u.cache_creation_input_tokens.unwrap_or(0)
            + u.cache_read_input_tokens.unwrap_or(0);

        Ok(LlmResponse {
            message: Message::assistant_with_tool_calls(text, tool_calls),
            stop_reason: stop,
            usage: Usage::new(prompt, u.output_tokens),
        })
    }

    fn classify_error(
        &self,
        status: u16,
        body: &str,
        retry_after: Option<Duration>,
        model: &str,
    ) -> ProviderError {
        let message = error_message(body);
        let error_type = serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|v| v.pointer("/error/type").and_then(Value::as_str).map(str::to_string));

        match error_type.as_deref() {
            Some("authentication_error") | Some("permission_error") => {
                ProviderError::Authentication {
                    provider: NAME.to_string(),
                    message,
                }
            }
            Some("rate_limit_error") => ProviderError::RateLimit {
                provider: NAME.to_string(),
                message,
                retry_after,
            },
            Some("not_found_error") => ProviderError::ModelNotFound {
                provider: NAME.to_string(),
                model: model.to_string(),
            },
            Some("invalid_request_error") if mentions_context_length(&message) => {
                ProviderError::ContextLengthExceeded {
                    provider: NAME.to_string(),
                    message,
                    token_count: None,
                    max_tokens: None,
                }
            }
            // overloaded_error (529) and api_error (500) stay retryable Api errors
            _ => classify_status(NAME, status, message, retry_after, model),
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
