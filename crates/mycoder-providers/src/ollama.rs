//! Ollama chat adapter (`POST {base}/api/chat`, non-streaming).
//!
//! Ollama passes tool arguments as JSON *objects* and issues no call ids, so
//! ids are generated here. Models without native tool support often answer
//! with a fenced JSON object instead; when tools were offered and no native
//! call came back, such a block naming an offered tool is read as a call.
//!
//! Usage: prompt = `prompt_eval_count`, completion = `eval_count`; both are
//! absent on cache hits and count as 0.

use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use mycoder_core::error::ProviderError;
use mycoder_core::schema::{shape_for, ProviderKind};
use mycoder_core::types::{LlmResponse, Message, StopReason, ToolCall, Usage};

use crate::adapter::{classify_status, error_message, invalid_response, ProviderAdapter};
use crate::traits::LlmRequestConfig;

const NAME: &str = "ollama";

// ─────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
    stream: bool,
    options: Value,
}

#[derive(Serialize, Deserialize, Default)]
struct WireMessage {
    #[serde(default)]
    role: String,
    #[serde(default)]
    content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    /// Name of the tool a `tool` message answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_name: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct WireToolCall {
    function: WireFunction,
}

#[derive(Serialize, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: WireMessage,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
}

// ─────────────────────────────────────────────
// Adapter
// ─────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Default)]
pub struct OllamaAdapter;

fn new_call_id() -> String {
    format!("call_{}", uuid::Uuid::new_v4().simple())
}

fn to_wire(messages: &[Message]) -> Vec<WireMessage> {
    // Ollama links results by tool name, not id.
    let mut names: HashMap<&str, &str> = HashMap::new();
    let mut out = Vec::with_capacity(messages.len());

    for message in messages {
        let wire = match message {
            Message::System { content } => WireMessage {
                role: "system".into(),
                content: content.clone(),
                ..Default::default()
            },
            Message::User { content } => WireMessage {
                role: "user".into(),
                content: content.as_text(),
                ..Default::default()
            },
            Message::Assistant {
                content,
                tool_calls,
            } => {
                for call in tool_calls {
                    names.insert(call.id.as_str(), call.name.as_str());
                }
                WireMessage {
                    role: "assistant".into(),
                    content: content.as_text(),
                    tool_calls: tool_calls
                        .iter()
                        .map(|call| WireToolCall {
                            function: WireFunction {
                                name: call.name.clone(),
                                arguments: Value::Object(call.arguments.clone()),
                            },
                        })
                        .collect(),
                    tool_name: None,
                }
            }
            Message::Tool {
                tool_call_id,
                content,
                ..
            } => WireMessage {
                role: "tool".into(),
                content: content.clone(),
                tool_calls: Vec::new(),
                tool_name: names.get(tool_call_id.as_str()).map(|n| n.to_string()),
            },
        };
        out.push(wire);
    }
    out
}

fn fenced_json() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").ok())
        .as_ref()
}

/// Some models send the argument object as a JSON string.
fn wire_tool_call(function: WireFunction) -> ToolCall {
    let id = new_call_id();
    match function.arguments {
        Value::String(text) => match serde_json::from_str::<Value>(&text) {
            Ok(value @ Value::Object(_)) => ToolCall::new(id, function.name, value),
            Ok(_) => ToolCall::malformed(id, function.name, text, "arguments must be a JSON object"),
            Err(e) => ToolCall::malformed(id, function.name, text, e.to_string()),
        },
        other => ToolCall::new(id, function.name, other),
    }
}

/// Find a fenced `{"name": .., "arguments": {..}}` block naming an offered tool.
fn text_tool_call(text: &str, tools: &[Value]) -> Option<ToolCall> {
    let shape = shape_for(ProviderKind::Ollama);
    let offered: Vec<String> = tools
        .iter()
        .filter_map(|t| shape.extract(t).map(|spec| spec.name))
        .collect();

    fenced_json()?.captures_iter(text).find_map(|caps| {
        let value: Value = serde_json::from_str(caps.get(1)?.as_str()).ok()?;
        let name = value.get("name")?.as_str()?;
        if !offered.iter().any(|o| o == name) {
            return None;
        }
        let args = value.get("arguments").cloned().unwrap_or_else(|| json!({}));
        Some(ToolCall::new(new_call_id(), name, args))
    })
}

impl ProviderAdapter for OllamaAdapter {
    fn name(&self) -> &'static str {
        NAME
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Ollama
    }

    fn endpoint(&self) -> &'static str {
        "/api/chat"
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
            messages: to_wire(messages),
            tools: tools.to_vec(),
            stream: false,
            options: json!({
                "temperature": config.temperature,
                "num_predict": config.max_tokens,
            }),
        };
        serde_json::to_value(request).map_err(|e| invalid_response(NAME, e))
    }

    fn parse_response(&self, body: Value, tools: &[Value]) -> Result<LlmResponse, ProviderError> {
        if let Some(err) = body.get("error").and_then(Value::as_str) {
            return Err(invalid_response(NAME, err));
        }
        let resp: ChatResponse = serde_json::from_value(body).map_err(|e| invalid_response(NAME, e))?;

        let mut content = resp.message.content;
        let mut tool_calls: Vec<ToolCall> = resp
            .message
            .tool_calls
            .into_iter()
            .map(|call| wire_tool_call(call.function))
            .collect();

        if tool_calls.is_empty() && !tools.is_empty() {
            if let Some(call) = text_tool_call(&content, tools) {
                tool_calls.push(call);
                content.clear();
            }
        }

        let stop = if !tool_calls.is_empty() {
            StopReason::ToolUse
        } else {
            match resp.done_reason.as_deref() {
                None | Some("stop") => StopReason::EndTurn,
                Some("length") => StopReason::MaxTokens,
                Some(other) => StopReason::Other(other.to_string()),
            }
        };

        Ok(LlmResponse {
            message: Message::assistant_with_tool_calls(content, tool_calls),
            stop_reason: stop,
            usage: Usage::new(
                resp.prompt_eval_count.unwrap_or(0),
                resp.eval_count.unwrap_or(0),
            ),
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
        if message.contains("not found") && message.contains("model") {
            return ProviderError::ModelNotFound {
                provider: NAME.to_string(),
                model: model.to_string(),
            };
        }
        classify_status(NAME, status, message, retry_after, model)
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
