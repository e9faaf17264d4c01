//! User interaction tools: ask the human a question or show them a message.
//!
//! The terminal side is behind [`UserPrompter`] so the agent crate stays
//! free of any console dependency; the CLI supplies the implementation.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::base::{optional_bool, optional_string, optional_string_list, require_string, Tool, ToolArgs};

/// What the agent wants to ask.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PromptRequest {
    pub message: String,
    pub default: Option<String>,
    /// Hide the typed input.
    pub password: bool,
    /// Restrict the answer to one of these values.
    pub choices: Option<Vec<String>>,
}

/// Severity used when displaying a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageLevel {
    Info,
    Warning,
    Error,
    Success,
}

impl MessageLevel {
    fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "warning" | "warn" => MessageLevel::Warning,
            "error" => MessageLevel::Error,
            "success" => MessageLevel::Success,
            _ => MessageLevel::Info,
        }
    }
}

/// Human on the other side of the agent.
#[async_trait]
pub trait UserPrompter: Send + Sync {
    /// Ask a question. `Ok(None)` means the user cancelled.
    async fn ask(&self, request: &PromptRequest) -> anyhow::Result<Option<String>>;

    /// Display a message.
    async fn show(&self, content: &str, level: MessageLevel) -> anyhow::Result<()>;
}

// ─────────────────────────────────────────────
// user_prompt
// ─────────────────────────────────────────────

pub struct UserPromptTool {
    prompter: Arc<dyn UserPrompter>,
}

impl UserPromptTool {
    pub fn new(prompter: Arc<dyn UserPrompter>) -> Self {
        Self { prompter }
    }
}

#[async_trait]
impl Tool for UserPromptTool {
    fn name(&self) -> &str {
        "user_prompt"
    }

    fn description(&self) -> &str {
        "Ask the user for input with a message and return their response"
    }

    fn args_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "message": {
                    "type": "string",
                    "description": "The message to display to the user"
                },
                "default": {
                    "type": "string",
                    "description": "Value used if the user gives no input"
                },
                "password": {
                    "type": "boolean",
                    "description": "Hide the user's input (for sensitive information)"
                },
                "choices": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Valid answers to present to the user"
                }
            },
            "required": ["message"]
        })
    }

    async fn execute(&self, args: ToolArgs) -> anyhow::Result<Value> {
        let request = PromptRequest {
            message: require_string(&args, "message")?,
            default: optional_string(&args, "default"),
            password: optional_bool(&args, "password"),
            choices: optional_string_list(&args, "choices").filter(|c| !c.is_empty()),
        };

        let answer = match self.prompter.ask(&request).await? {
            Some(answer) => answer,
            None => anyhow::bail!("User cancelled input"),
        };
        let answer = match (&request.default, answer.trim().is_empty()) {
            (Some(default), true) => default.clone(),
            _ => answer,
        };

        if let Some(choices) = &request.choices {
            if !choices.contains(&answer) {
                anyhow::bail!(
                    "Answer '{answer}' is not one of the choices: {}",
                    choices.join(", ")
                );
            }
        }
        Ok(Value::String(answer))
    }
}

// ─────────────────────────────────────────────
// user_message
// ─────────────────────────────────────────────

pub struct UserMessageTool {
    prompter: Arc<dyn UserPrompter>,
}

impl UserMessageTool {
    pub fn new(prompter: Arc<dyn UserPrompter>) -> Self {
        Self { prompter }
    }
}

#[async_trait]
impl Tool for UserMessageTool {
    fn name(&self) -> &str {
        "user_message"
    }

    fn description(&self) -> &str {
        "Display a message to the user without waiting for a reply"
    }

    fn args_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "content": {
                    "type": "string",
                    "description": "The content to display"
                },
                "level": {
                    "type": "string",
                    "enum": ["info", "warning", "error", "success"],
                    "description": "Message level"
                }
            },
            "required": ["content"]
        })
    }

    async fn execute(&self, args: ToolArgs) -> anyhow::Result<Value> {
        let content = require_string(&args, "content")?;
        let level = MessageLevel::parse(&optional_string(&args, "level").unwrap_or_default());
        self.prompter.show(&content, level).await?;
        Ok(json!(true))
    }
}
