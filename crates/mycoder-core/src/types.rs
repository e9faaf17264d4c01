//! Core types for MyCoder: the provider-neutral conversation model.
//!
//! Every vendor adapter translates to and from these types, so the agent loop
//! and the tool registry never see a vendor wire shape. Messages are an enum
//! keyed by role: a tool-role message cannot exist without its
//! `tool_call_id`, and only assistant messages carry tool calls.

use std::ops::AddAssign;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::MessageError;

// ─────────────────────────────────────────────
// Roles
// ─────────────────────────────────────────────

/// Conversation role of a [`Message`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────
// Messages
// ─────────────────────────────────────────────

/// One turn of conversation.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    System {
        content: String,
    },

    User {
        content: MessageContent,
    },

    Assistant {
        #[serde(default)]
        content: MessageContent,
        /// Tool calls in the order the model emitted them.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },

    Tool {
        tool_call_id: String,
        content: String,
        /// Set when `content` describes a failed tool execution.
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

impl Message {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Message::System {
            content: content.into(),
        }
    }

    /// Create a user message with text content.
    pub fn user(content: impl Into<String>) -> Self {
        Message::User {
            content: MessageContent::Text(content.into()),
        }
    }

    /// Create an assistant message with text content.
    pub fn assistant(content: impl Into<String>) -> Self {
        Message::Assistant {
            content: MessageContent::Text(content.into()),
            tool_calls: Vec::new(),
        }
    }

    /// Create an assistant message requesting tool calls.
    pub fn assistant_with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Message::Assistant {
            content: MessageContent::Text(content.into()),
            tool_calls,
        }
    }

    /// Create a successful tool result message.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Message::Tool {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
            is_error: false,
        }
    }

    /// Create a tool result message describing a failure.
    pub fn tool_error(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Message::Tool {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
            is_error: true,
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Message::System { .. } => Role::System,
            Message::User { .. } => Role::User,
            Message::Assistant { .. } => Role::Assistant,
            Message::Tool { .. } => Role::Tool,
        }
    }

    /// Flattened text content of the message.
    pub fn text(&self) -> String {
        match self {
            Message::System { content } => content.clone(),
            Message::User { content } | Message::Assistant { content, .. } => content.as_text(),
            Message::Tool { content, .. } => content.clone(),
        }
    }

    /// Tool calls carried by an assistant message (empty for other roles).
    pub fn tool_calls(&self) -> &[ToolCall] {
        match self {
            Message::Assistant { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }

    /// Back-reference of a tool-role message.
    pub fn tool_call_id(&self) -> Option<&str> {
        match self {
            Message::Tool { tool_call_id, .. } => Some(tool_call_id),
            _ => None,
        }
    }

    /// Validate this message in isolation.
    pub fn validate(&self) -> Result<(), MessageError> {
        match self {
            Message::Tool { tool_call_id, .. } if tool_call_id.trim().is_empty() => {
                Err(MessageError::MissingToolCallId)
            }
            Message::Assistant { tool_calls, .. } => {
                for (i, call) in tool_calls.iter().enumerate() {
                    if call.id.trim().is_empty() {
                        return Err(MessageError::MissingToolCallId);
                    }
                    if tool_calls[..i].iter().any(|c| c.id == call.id) {
                        return Err(MessageError::DuplicateToolCallId {
                            id: call.id.clone(),
                        });
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// Check the tool-call linkage invariant over a whole history.
///
/// Every tool-role message must answer a still-pending call of the closest
/// preceding assistant message, and no other message may follow while calls
/// are pending. Trailing pending calls are allowed (the turn is in flight).
pub fn validate_history(messages: &[Message]) -> Result<(), MessageError> {
    let mut pending: Vec<&str> = Vec::new();

    for message in messages {
        message.validate()?;
        match message {
            Message::Tool { tool_call_id, .. } => {
                match pending.iter().position(|id| *id == tool_call_id.as_str()) {
                    Some(pos) => {
                        pending.remove(pos);
                    }
                    None => {
                        return Err(MessageError::OrphanToolResult {
                            id: tool_call_id.clone(),
                        })
                    }
                }
            }
            other => {
                if !pending.is_empty() {
                    return Err(MessageError::UnansweredToolCalls {
                        ids: pending.iter().map(|s| s.to_string()).collect(),
                    });
                }
                pending = other.tool_calls().iter().map(|c| c.id.as_str()).collect();
            }
        }
    }

    Ok(())
}

// ─────────────────────────────────────────────
// Message content
// ─────────────────────────────────────────────

/// Message content: plain text or a list of structured parts.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Concatenate all textual content.
    pub fn as_text(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .map(|p| match p {
                    ContentPart::Text { text } => text.as_str(),
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            MessageContent::Text(text) => text.is_empty(),
            MessageContent::Parts(parts) => parts.iter().all(|p| match p {
                ContentPart::Text { text } => text.is_empty(),
            }),
        }
    }
}

impl Default for MessageContent {
    fn default() -> Self {
        MessageContent::Text(String::new())
    }
}

impl From<&str> for MessageContent {
    fn from(value: &str) -> Self {
        MessageContent::Text(value.to_string())
    }
}

impl From<String> for MessageContent {
    fn from(value: String) -> Self {
        MessageContent::Text(value)
    }
}

/// A single part of structured content.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentPart {
    Text { text: String },
}

// ─────────────────────────────────────────────
// Tool calls
// ─────────────────────────────────────────────

/// A model-issued request to invoke a named tool.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    /// Vendor-issued id, unique within one assistant turn.
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
    /// Set when the model's argument text was not a JSON object.
    /// `arguments` is empty in that case and the call must not run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub malformed_arguments: Option<MalformedArguments>,
}

/// Argument text that failed to parse, kept verbatim.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MalformedArguments {
    pub raw: String,
    pub error: String,
}

impl ToolCall {
    /// Create a tool call. `null` arguments become an empty map; any other
    /// non-object value marks the call as malformed.
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        match arguments {
            Value::Object(map) => ToolCall {
                id: id.into(),
                name: name.into(),
                arguments: map,
                malformed_arguments: None,
            },
            Value::Null => ToolCall::new(id, name, Value::Object(Map::new())),
            other => ToolCall::malformed(id, name, other.to_string(), "arguments must be a JSON object"),
        }
    }

    /// A call whose argument text could not be parsed.
    pub fn malformed(
        id: impl Into<String>,
        name: impl Into<String>,
        raw: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        ToolCall {
            id: id.into(),
            name: name.into(),
            arguments: Map::new(),
            malformed_arguments: Some(MalformedArguments {
                raw: raw.into(),
                error: error.into(),
            }),
        }
    }

    /// Argument text to send back to a vendor that carries arguments as a
    /// string: the raw text for malformed calls, otherwise the JSON object.
    pub fn arguments_text(&self) -> String {
        match &self.malformed_arguments {
            Some(bad) => bad.raw.clone(),
            None => Value::Object(self.arguments.clone()).to_string(),
        }
    }
}

// ─────────────────────────────────────────────
// LLM response
// ─────────────────────────────────────────────

/// Why the model stopped generating.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// Normal completion.
    EndTurn,
    /// Tool calls are pending.
    ToolUse,
    /// `max_tokens` was reached.
    MaxTokens,
    /// The vendor filtered the output.
    ContentFilter,
    Other(String),
}

/// Token usage reported for one request.
///
/// Counters are exactly what the vendor reports; see each adapter for the
/// field mapping.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl Usage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
        }
    }

    pub fn total(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

impl AddAssign for Usage {
    fn add_assign(&mut self, rhs: Self) {
        self.prompt_tokens += rhs.prompt_tokens;
        self.completion_tokens += rhs.completion_tokens;
    }
}

/// Normalized response from any provider.
#[derive(Clone, Debug, PartialEq)]
pub struct LlmResponse {
    /// Always an assistant message.
    pub message: Message,
    pub stop_reason: StopReason,
    pub usage: Usage,
}

impl LlmResponse {
    /// A plain text completion.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            message: Message::assistant(content),
            stop_reason: StopReason::EndTurn,
            usage: Usage::default(),
        }
    }

    /// A response requesting tool calls.
    pub fn tool_calls(content: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            message: Message::assistant_with_tool_calls(content, calls),
            stop_reason: StopReason::ToolUse,
            usage: Usage::default(),
        }
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }

    pub fn content(&self) -> String {
        self.message.text()
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.message.tool_calls().is_empty()
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
