//! Sub-agent tools: delegate work to nested agent loops.
//!
//! `sync` mode exposes only `sub_agent`, which always blocks on the child.
//! `async` mode adds status polling, cancellation and concurrent groups.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use mycoder_core::config::SubAgentMode;

use super::base::{optional_bool, optional_i64, optional_string, optional_string_list, require_string, Tool, ToolArgs};
use crate::subagent::{JoinPolicy, SubagentManager, SubagentRequest};

/// The tools to register for `mode`.
pub fn sub_agent_tools(manager: Arc<SubagentManager>, mode: SubAgentMode) -> Vec<Arc<dyn Tool>> {
    match mode {
        SubAgentMode::Disabled => Vec::new(),
        SubAgentMode::Sync => vec![Arc::new(SubAgentTool::new(manager, mode))],
        SubAgentMode::Async => vec![
            Arc::new(SubAgentTool::new(manager.clone(), mode)),
            Arc::new(SubAgentStatusTool { manager: manager.clone() }),
            Arc::new(SubAgentCancelTool { manager: manager.clone() }),
            Arc::new(SubAgentGroupTool { manager }),
        ],
    }
}

fn tools_property() -> Value {
    json!({
        "type": "array",
        "items": { "type": "string" },
        "description": "Tool names the sub-agent may use. Inherits all tools when omitted."
    })
}

// ─────────────────────────────────────────────
// sub_agent
// ─────────────────────────────────────────────

pub struct SubAgentTool {
    manager: Arc<SubagentManager>,
    mode: SubAgentMode,
}

impl SubAgentTool {
    pub fn new(manager: Arc<SubagentManager>, mode: SubAgentMode) -> Self {
        Self { manager, mode }
    }
}

#[async_trait]
impl Tool for SubAgentTool {
    fn name(&self) -> &str {
        "sub_agent"
    }

    fn description(&self) -> &str {
        match self.mode {
            SubAgentMode::Async => {
                "Spawn a subordinate agent to handle a task. Returns its agent_id immediately \
                 unless wait is true."
            }
            _ => "Run a subordinate agent on a self-contained task and return its final answer.",
        }
    }

    fn args_schema(&self) -> Value {
        let mut schema = json!({
            "type": "object",
            "properties": {
                "prompt": {
                    "type": "string",
                    "minLength": 1,
                    "description": "The instruction for the sub-agent"
                },
                "tools": tools_property(),
                "working_dir": {
                    "type": "string",
                    "description": "Working directory for the sub-agent"
                }
            },
            "required": ["prompt"]
        });
        if self.mode == SubAgentMode::Async {
            schema["properties"]["wait"] = json!({
                "type": "boolean",
                "description": "Wait for the sub-agent to finish before returning"
            });
        }
        schema
    }

    async fn execute(&self, args: ToolArgs) -> anyhow::Result<Value> {
        let request = SubagentRequest {
            prompt: require_string(&args, "prompt")?,
            tools: optional_string_list(&args, "tools"),
            working_dir: optional_string(&args, "working_dir"),
        };
        let wait = self.mode != SubAgentMode::Async || optional_bool(&args, "wait");

        if wait {
            let report = self.manager.run(request).await?;
            return Ok(report.to_json());
        }
        let agent_id = self.manager.spawn(request).await?;
        Ok(json!({ "agent_id": agent_id, "status": "running" }))
    }
}

// ─────────────────────────────────────────────
// sub_agent_status
// ─────────────────────────────────────────────

pub struct SubAgentStatusTool {
    manager: Arc<SubagentManager>,
}

#[async_trait]
impl Tool for SubAgentStatusTool {
    fn name(&self) -> &str {
        "sub_agent_status"
    }

    fn description(&self) -> &str {
        "Get the status (and result, once finished) of a sub-agent"
    }

    fn args_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "agent_id": { "type": "string", "description": "Id returned by sub_agent" },
                "wait": { "type": "boolean", "description": "Block until the sub-agent finishes" }
            },
            "required": ["agent_id"]
        })
    }

    async fn execute(&self, args: ToolArgs) -> anyhow::Result<Value> {
        let agent_id = require_string(&args, "agent_id")?;
        let report = if optional_bool(&args, "wait") {
            self.manager.wait(&agent_id).await?
        } else {
            self.manager.status(&agent_id).await?
        };
        Ok(report.to_json())
    }
}

// ─────────────────────────────────────────────
// sub_agent_cancel
// ─────────────────────────────────────────────

pub struct SubAgentCancelTool {
    manager: Arc<SubagentManager>,
}

#[async_trait]
impl Tool for SubAgentCancelTool {
    fn name(&self) -> &str {
        "sub_agent_cancel"
    }

    fn description(&self) -> &str {
        "Cancel a running sub-agent"
    }

    fn args_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "agent_id": { "type": "string", "description": "Id returned by sub_agent" }
            },
            "required": ["agent_id"]
        })
    }

    async fn execute(&self, args: ToolArgs) -> anyhow::Result<Value> {
        let agent_id = require_string(&args, "agent_id")?;
        if !self.manager.cancel(&agent_id).await? {
            anyhow::bail!("Sub-agent {agent_id} already completed or failed");
        }
        Ok(json!({
            "agent_id": agent_id,
            "status": "cancelled",
        }))
    }
}

// ─────────────────────────────────────────────
// sub_agent_group
// ─────────────────────────────────────────────

pub struct SubAgentGroupTool {
    manager: Arc<SubagentManager>,
}

#[async_trait]
impl Tool for SubAgentGroupTool {
    fn name(&self) -> &str {
        "sub_agent_group"
    }

    fn description(&self) -> &str {
        "Run several independent tasks in parallel sub-agents. Waits for all of them, \
         or only for the first wait_for to finish (the rest are cancelled)."
    }

    fn args_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "prompts": {
                    "type": "array",
                    "items": { "type": "string", "minLength": 1 },
                    "minItems": 1,
                    "description": "One instruction per sub-agent"
                },
                "tools": tools_property(),
                "wait_for": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Continue once this many sub-agents have finished"
                }
            },
            "required": ["prompts"]
        })
    }

    async fn execute(&self, args: ToolArgs) -> anyhow::Result<Value> {
        let prompts = optional_string_list(&args, "prompts").unwrap_or_default();
        if prompts.is_empty() {
            anyhow::bail!("prompts must contain at least one task");
        }
        let tools = optional_string_list(&args, "tools");
        let policy = match optional_i64(&args, "wait_for") {
            Some(n) if n > 0 && (n as usize) < prompts.len() => JoinPolicy::Threshold(n as usize),
            _ => JoinPolicy::WaitAll,
        };

        let requests = prompts
            .into_iter()
            .map(|prompt| SubagentRequest {
                prompt,
                tools: tools.clone(),
                working_dir: None,
            })
            .collect();
        let reports = self.manager.run_group(requests, policy).await?;
        let agents: Vec<Value> = reports.iter().map(|r| r.to_json()).collect();
        Ok(json!({ "agents": agents }))
    }
}
