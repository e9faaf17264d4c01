//! Think tool: a scratchpad for step-by-step reasoning with no side effects.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::base::{require_string, Tool, ToolArgs};

pub struct ThinkTool;

#[async_trait]
impl Tool for ThinkTool {
    fn name(&self) -> &str {
        "think"
    }

    fn description(&self) -> &str {
        "Reason step-by-step through a complex problem without executing any external \
         actions. Use it for planning, breaking down problems or exploring alternatives. \
         Nothing outside the conversation changes."
    }

    fn args_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "thought": {
                    "type": "string",
                    "description": "Your internal reasoning"
                }
            },
            "required": ["thought"]
        })
    }

    fn returns_schema(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": { "result": { "type": "string" } }
        }))
    }

    async fn execute(&self, args: ToolArgs) -> anyhow::Result<Value> {
        let thought = require_string(&args, "thought")?;
        debug!(chars = thought.len(), "recorded thought");
        Ok(json!({ "result": format!("I have processed your thinking: {thought}") }))
    }
}
