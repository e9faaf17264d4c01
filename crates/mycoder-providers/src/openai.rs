//! OpenAI Chat Completions adapter (`POST {base}/chat/completions`).
//!
//! Tool calls travel as `tool_calls[].function.arguments` JSON *strings*;
//! tool results are `role: "tool"` messages carrying `tool_call_id`.
//! Usage maps `prompt_tokens` / `completion_tokens` one to one.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use mycoder_core::error::ProviderError;
use mycoder_core::schema::ProviderKind;
use mycoder_core::types::{LlmResponse, Message, StopReason, ToolCall, Usage};

use crate::adapter::{classify_status, error_message, invalid_response, ProviderAdapter};
use crate::traits::LlmRequestConfig;

const NAME: &str = "openai";

// ─────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "no_tools")]
    tools: &'a [Value],
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Serialize)]
struct WireMessage {
    role: &'static str,
    /// `null` for assistant turns that only carry tool calls.
    content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    call_type: String,
    function: WireFunction,
}

fn no_tools(tools: &&[Value]) -> bool {
    tools.is_empty()
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Serialize, Deserialize)]
struct WireFunction {
    name: String,
    /// JSON-encoded argument object.
    #[serde(default)]
    arguments: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(default)]
    refusal: Option<String>,
}

#[derive(Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

// ─────────────────────────────────────────────
// Adapter
// ─────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Default)]
pub struct OpenAiAdapter;

fn to_wire(message: &Message) -> WireMessage {
    match message {
        Message::System { content } => WireMessage {
            role: "system",
            content: Some(content.clone()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        },
        Message::User { content } => WireMessage {
            role: "user",
            content: Some(content.as_text()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        },
        Message::Assistant {
            content,
            tool_calls,
        } => WireMessage {
            role: "assistant",
            // Tool-call turns may omit content entirely.
            content: if content.is_empty() && !tool_calls.is_empty() {
                None
            } else {
                Some(content.as_text())
            },
            tool_calls: tool_calls
                .iter()
                .map(|call| WireToolCall {
                    id: call.id.clone(),
                    call_type: function_type(),
                    function: WireFunction {
                        name: call.name.clone(),
                        arguments: call.arguments_text(),
                    },
                })
                .collect(),
            tool_call_id: None,
        },
        Message::Tool {
            tool_call_id,
            content,
            ..
        } => WireMessage {
            role: "tool",
            content: Some(content.clone()),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.clone()),
        },
    }
}

/// Parse the argument text of one call. Text that is not a JSON object is
/// kept on the call so the tool layer can report it back to the model.
fn parse_tool_call(id: String, function: WireFunction) -> ToolCall {
    if function.arguments.trim().is_empty() {
        return ToolCall::new(id, function.name, Value::Object(Default::default()));
    }
    match serde_json::from_str::<Value>(&function.arguments) {
        Ok(Value::Object(map)) => ToolCall::new(id, function.name, Value::Object(map)),
        Ok(_) => ToolCall::malformed(id, function.name, function.arguments, "arguments must be a JSON object"),
        Err(e) => {
            warn!(tool = %function.name, error = %e, "Tool call arguments are not valid JSON");
            ToolCall::malformed(id, function.name, function.arguments, e.to_string())
        }
    }
}

fn stop_reason(finish_reason: Option<&str>) -> StopReason {
    match finish_reason {
        None | Some("stop") => StopReason::EndTurn,
        Some("tool_calls") | Some("function_call") => StopReason::ToolUse,
        Some("length") => StopReason::MaxTokens,
        Some("content_filter") => StopReason::ContentFilter,
        Some(other) => StopReason::Other(other.to_string()),
    }
}

impl ProviderAdapter for OpenAiAdapter {
    fn name(&self) -> &'static str {
        NAME
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn endpoint(&self) -> &'static str {
        "/chat/completions"
    }

    fn build_request(
        &self,
        model: &str,
        messages: &[Message],
        tools: &[Value],
        config: &LlmRequestConfig,
    ) -> Result<Value, ProviderError> {
        let request = ChatRequest {
            model,
            messages: messages.iter().map(to_wire).collect(),
            tools,
            tool_choice: (!tools.is_empty()).then_some("auto"),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        };
        serde_json::to_value(request).map_err(|e| invalid_response(NAME, e))
    }

    fn parse_response(&self, body: Value, _tools: &[Value]) -> Result<LlmResponse, ProviderError> {
        let resp: ChatResponse = serde_json::from_value(body).map_err(|e| invalid_response(NAME, e))?;
        let choice = resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| invalid_response(NAME, "response has no choices"))?;

        let tool_calls: Vec<ToolCall> = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| parse_tool_call(call.id, call.function))
            .collect();

        let content = choice.message.content.unwrap_or_default();
        let mut stop = stop_reason(choice.finish_reason.as_deref());
        if !tool_calls.is_empty() {
            stop = StopReason::ToolUse;
        }

        if let Some(refusal) = choice.message.refusal.filter(|r| !r.is_empty()) {
            return Err(ProviderError::ContentFilter {
                provider: NAME.to_string(),
                message: refusal,
            });
        }
        if stop == StopReason::ContentFilter && content.is_empty() && tool_calls.is_empty() {
            return Err(ProviderError::ContentFilter {
                provider: NAME.to_string(),
                message: "response was blocked by the content filter".to_string(),
            });
        }

        let usage = resp
            .usage
            .map(|u| Usage::new(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();

        Ok(LlmResponse {
            message: Message::assistant_with_tool_calls(content, tool_calls),
            stop_reason: stop,
            usage,
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
        let code = serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|v| v.pointer("/error/code").and_then(Value::as_str).map(str::to_string));

        match code.as_deref() {
            Some("context_length_exceeded") => ProviderError::ContextLengthExceeded {
                provider: NAME.to_string(),
                message,
                token_count: None,
                max_tokens: None,
            },
            Some("content_filter") => ProviderError::ContentFilter {
                provider: NAME.to_string(),
                message,
            },
            Some("model_not_found") => ProviderError::ModelNotFound {
                provider: NAME.to_string(),
                model: model.to_string(),
            },
            Some("invalid_api_key") => ProviderError::Authentication {
                provider: NAME.to_string(),
                message,
            },
            _ => classify_status(NAME, status, message, retry_after, model),
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
