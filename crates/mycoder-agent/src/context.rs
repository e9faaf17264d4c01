//! Context builder: constructs the system prompt for the main agent and
//! for sub-agents.

use std::path::PathBuf;

use chrono::Utc;
use tracing::debug;

use mycoder_core::config::SubAgentMode;

use crate::mcp::McpResource;

/// Builds system prompts for the agent loop.
#[derive(Clone, Debug)]
pub struct ContextBuilder {
    /// Directory the agent works in.
    workspace: PathBuf,
    agent_name: String,
    tool_names: Vec<String>,
    sub_agent_mode: SubAgentMode,
    /// Extra instructions from `agent.customPrompt`.
    custom_prompt: String,
    /// MCP resources preloaded at startup.
    resources: Vec<McpResource>,
}

impl ContextBuilder {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
            agent_name: "MyCoder".into(),
            tool_names: Vec::new(),
            sub_agent_mode: SubAgentMode::Disabled,
            custom_prompt: String::new(),
            resources: Vec::new(),
        }
    }

    pub fn with_tools(mut self, names: Vec<String>) -> Self {
        self.tool_names = names;
        self
    }

    pub fn with_sub_agent_mode(mut self, mode: SubAgentMode) -> Self {
        self.sub_agent_mode = mode;
        self
    }

    pub fn with_custom_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.custom_prompt = prompt.into();
        self
    }

    pub fn with_resources(mut self, resources: Vec<McpResource>) -> Self {
        self.resources = resources;
        self
    }

    pub fn workspace(&self) -> &PathBuf {
        &self.workspace
    }

    // ────────────── System prompt ──────────────

    /// Build the full system prompt for the main agent.
    pub fn build_system_prompt(&self) -> String {
        let mut parts: Vec<String> = vec![self.build_identity()];

        if !self.tool_names.is_empty() {
            parts.push(format!(
                "# Tools\n\n\
                 Available tools: {}.\n\
                 Prefer tools over guessing: read files before changing them and run \
                 commands to verify your work.",
                self.tool_names.join(", ")
            ));
        }

        if let Some(guidance) = self.sub_agent_guidance() {
            parts.push(guidance);
        }

        for resource in &self.resources {
            debug!(uri = %resource.uri, "adding MCP resource to prompt");
            parts.push(format!("## Resource {}\n\n{}", resource.uri, resource.content));
        }

        if !self.custom_prompt.trim().is_empty() {
            parts.push(format!("# Additional Instructions\n\n{}", self.custom_prompt.trim()));
        }

        parts.join("\n\n---\n\n")
    }

    /// System prompt for a sub-agent working on one delegated task.
    pub fn build_subagent_prompt(&self, working_dir: Option<&str>) -> String {
        let dir = working_dir
            .map(str::to_string)
            .unwrap_or_else(|| self.workspace.display().to_string());
        let mut prompt = format!(
            "# Sub-agent\n\n\
             You are a sub-agent of {name}, working on a single delegated task.\n\n\
             - **Date**: {date}\n\
             - **Working directory**: `{dir}`\n\n\
             Complete the task using your tools, then reply with a concise summary of \
             what you did and what you found. Your reply is returned to the agent that \
             delegated the task, not to a human.",
            name = self.agent_name,
            date = Utc::now().format("%Y-%m-%d"),
        );
        if !self.custom_prompt.trim().is_empty() {
            prompt.push_str("\n\n");
            prompt.push_str(self.custom_prompt.trim());
        }
        prompt
    }

    /// Core identity block.
    fn build_identity(&self) -> String {
        let now = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
        let os = std::env::consts::OS;
        let arch = std::env::consts::ARCH;
        let workspace = self.workspace.display();

        format!(
            "# Identity\n\n\
             You are **{name}**, an AI coding assistant.\n\n\
             - **Date/time**: {now}\n\
             - **Platform**: {os}/{arch}\n\
             - **Working directory**: `{workspace}`\n\n\
             Work step by step. When the task is done, answer with a short summary \
             for the user.",
            name = self.agent_name,
        )
    }

    fn sub_agent_guidance(&self) -> Option<String> {
        match self.sub_agent_mode {
            SubAgentMode::Disabled => None,
            SubAgentMode::Sync => Some(
                "# Sub-agents\n\n\
                 Use `sub_agent` to delegate a self-contained task. You wait for the \
                 sub-agent to finish and receive its final answer."
                    .into(),
            ),
            SubAgentMode::Async => Some(
                "# Sub-agents\n\n\
                 Use `sub_agent` to delegate a self-contained task; pass `wait: true` to \
                 block on the answer, otherwise poll with `sub_agent_status`. Use \
                 `sub_agent_group` to run independent tasks in parallel and `wait_for` \
                 to continue once enough of them have finished."
                    .into(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_and_tools() {
        let ctx = ContextBuilder::new("/work/project")
            .with_tools(vec!["read_file".into(), "shell".into()]);
        let prompt = ctx.build_system_prompt();
        assert!(prompt.contains("MyCoder"));
        assert!(prompt.contains("`/work/project`"));
        assert!(prompt.contains("read_file, shell"));
        assert!(prompt.contains(&Utc::now().format("%Y-%m-%d").to_string()));
        assert!(!prompt.contains("# Sub-agents"));
    }

    #[test]
    fn test_sub_agent_guidance_follows_mode() {
        let sync = ContextBuilder::new("/w").with_sub_agent_mode(SubAgentMode::Sync);
        assert!(sync.build_system_prompt().contains("You wait for the"));

        let async_mode = ContextBuilder::new("/w").with_sub_agent_mode(SubAgentMode::Async);
        assert!(async_mode.build_system_prompt().contains("sub_agent_group"));
    }

    #[test]
    fn test_custom_prompt_and_resources() {
        let ctx = ContextBuilder::new("/w")
            .with_custom_prompt("Always write tests.\nUse British spelling.")
            .with_resources(vec![McpResource {
                uri: "docs://style".into(),
                content: "Tabs, not spaces.".into(),
                metadata: None,
            }]);
        let prompt = ctx.build_system_prompt();
        assert!(prompt.contains("# Additional Instructions\n\nAlways write tests."));
        assert!(prompt.contains("## Resource docs://style\n\nTabs, not spaces."));
    }

    #[test]
    fn test_subagent_prompt() {
        let ctx = ContextBuilder::new("/w").with_custom_prompt("Be brief.");
        let prompt = ctx.build_subagent_prompt(Some("/w/crates/core"));
        assert!(prompt.contains("`/w/crates/core`"));
        assert!(prompt.ends_with("Be brief."));
        assert!(ctx.build_subagent_prompt(None).contains("`/w`"));
    }
}
