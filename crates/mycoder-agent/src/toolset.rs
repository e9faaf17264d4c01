//! Toolset assembly: turns a [`Config`] into a ready-to-run agent.
//!
//! Registration order matters for sub-agents: the base tools (built-ins and
//! MCP) are registered first and handed to the [`SubagentManager`] as the
//! children's tool set; the `sub_agent*` tools are added to the parent only
//! afterwards. Everything is registered before the first execution.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use mycoder_core::config::{Config, SubAgentMode};
use mycoder_core::utils::expand_home;
use mycoder_providers::traits::LlmProvider;

use crate::agent_loop::{AgentError, AgentLoop, LoopConfig};
use crate::context::ContextBuilder;
use crate::mcp::{fetch_resources, mcp_tools, register_default_tools, McpClient, McpSource, McpSources};
use crate::subagent::SubagentManager;
use crate::tools::filesystem::{EditFileTool, ListDirTool, ReadFileTool, WriteFileTool};
use crate::tools::shell::ShellTool;
use crate::tools::sleep::SleepTool;
use crate::tools::sub_agent::sub_agent_tools;
use crate::tools::think::ThinkTool;
use crate::tools::user::{UserMessageTool, UserPromptTool, UserPrompter};
use crate::tools::ToolManager;

/// Everything a front end needs to drive conversations.
pub struct Toolset {
    pub tools: Arc<ToolManager>,
    pub context: ContextBuilder,
    pub loop_config: LoopConfig,
    pub subagents: Option<Arc<SubagentManager>>,
    pub mcp: McpSources,
}

impl Toolset {
    /// The system prompt for a new main conversation.
    pub fn system_prompt(&self) -> String {
        self.context.build_system_prompt()
    }

    /// An agent loop over these tools.
    pub fn agent(&self, provider: Arc<dyn LlmProvider>) -> AgentLoop {
        AgentLoop::new(provider, self.tools.clone(), self.loop_config.clone())
    }
}

/// Workspace directory from config; the current directory when unset.
pub fn workspace_dir(config: &Config) -> PathBuf {
    if config.agent.workspace.trim().is_empty() {
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    } else {
        expand_home(&config.agent.workspace)
    }
}

/// One client per configured MCP server.
pub fn mcp_sources(config: &Config) -> McpSources {
    config
        .mcp
        .servers
        .iter()
        .map(|server| Arc::new(McpClient::new(server.clone())) as Arc<dyn McpSource>)
        .collect()
}

/// Register the built-in tools that need no outside services.
pub fn register_builtin_tools(
    tools: &mut ToolManager,
    config: &Config,
    workspace: PathBuf,
    prompter: Option<Arc<dyn UserPrompter>>,
) -> Result<(), AgentError> {
    let restrict = config.tools.restrict_to_workspace;
    let allowed_dir = restrict.then(|| workspace.clone());

    tools.register(Arc::new(ReadFileTool::new(allowed_dir.clone())))?;
    tools.register(Arc::new(WriteFileTool::new(allowed_dir.clone())))?;
    tools.register(Arc::new(EditFileTool::new(allowed_dir.clone())))?;
    tools.register(Arc::new(ListDirTool::new(allowed_dir)))?;
    tools.register(Arc::new(ShellTool::new(
        workspace,
        Some(config.tools.shell.timeout),
        restrict,
    )))?;
    tools.register(Arc::new(ThinkTool))?;
    tools.register(Arc::new(SleepTool))?;

    if let Some(prompter) = prompter {
        if config.tools.user_prompt {
            tools.register(Arc::new(UserPromptTool::new(prompter.clone())))?;
        }
        tools.register(Arc::new(UserMessageTool::new(prompter)))?;
    }
    Ok(())
}

/// Build the full toolset for `config`.
///
/// `prompter` enables the interactive user tools; pass `None` for
/// non-interactive runs.
pub async fn build_toolset(
    config: &Config,
    provider: Arc<dyn LlmProvider>,
    prompter: Option<Arc<dyn UserPrompter>>,
) -> Result<Toolset, AgentError> {
    let workspace = workspace_dir(config);
    let mode = config.agent.sub_agent_mode;

    let mut tools = ToolManager::new();
    register_builtin_tools(&mut tools, config, workspace.clone(), prompter)?;

    let mcp = mcp_sources(config);
    if !mcp.is_empty() {
        tools.register_all(mcp_tools(mcp.clone()))?;
        let remote = register_default_tools(&mut tools, &mcp, &config.mcp.default_tools).await?;
        info!(servers = mcp.len(), remote_tools = remote, "MCP servers configured");
    }
    let resources = fetch_resources(&mcp, &config.mcp.default_resources).await;

    let loop_config = LoopConfig::from_config(config);
    let context = ContextBuilder::new(workspace)
        .with_sub_agent_mode(mode)
        .with_custom_prompt(config.agent.custom_prompt.clone())
        .with_resources(resources);

    let subagents = if mode == SubAgentMode::Disabled {
        None
    } else {
        let manager = Arc::new(SubagentManager::new(
            provider,
            tools.clone(),
            loop_config.clone(),
            context.clone(),
        ));
        tools.register_all(sub_agent_tools(manager.clone(), mode))?;
        Some(manager)
    };

    let context = context.with_tools(tools.tool_names());
    info!(tools = tools.len(), sub_agents = ?mode, "toolset ready");

    Ok(Toolset {
        tools: Arc::new(tools),
        context,
        loop_config,
        subagents,
        mcp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mycoder_core::config::schema::McpServerConfig;
    use mycoder_core::schema::ProviderKind;
    use mycoder_core::types::{LlmResponse, ToolCall};
    use mycoder_providers::mock::MockProvider;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(mode: SubAgentMode) -> Config {
        let mut config = Config::default();
        config.agent.sub_agent_mode = mode;
        config.agent.workspace = std::env::temp_dir().display().to_string();
        config
    }

    fn mock() -> Arc<MockProvider> {
        Arc::new(MockProvider::new(ProviderKind::OpenAi))
    }

    #[tokio::test]
    async fn test_builtin_tools_without_subagents() {
        let set = build_toolset(&config(SubAgentMode::Disabled), mock(), None).await.unwrap();
        assert_eq!(
            set.tools.tool_names(),
            vec!["edit_file", "list_dir", "read_file", "shell", "sleep", "think", "write_file"]
        );
        assert!(set.subagents.is_none());
        assert!(set.system_prompt().contains("read_file, shell"));
    }

    #[tokio::test]
    async fn test_children_never_get_subagent_tools() {
        let set = build_toolset(&config(SubAgentMode::Async), mock(), None).await.unwrap();
        assert!(set.tools.has("sub_agent"));
        assert!(set.tools.has("sub_agent_group"));

        let children = set.subagents.as_ref().unwrap().available_tools();
        assert!(children.contains(&"shell".to_string()));
        assert!(!children.iter().any(|name| name.starts_with("sub_agent")));
        assert!(set.system_prompt().contains("# Sub-agents"));
    }

    #[tokio::test]
    async fn test_sync_mode_end_to_end() {
        let provider = Arc::new(MockProvider::new(ProviderKind::OpenAi).with_responses([
            LlmResponse::tool_calls(
                "",
                vec![ToolCall::new("s1", "sub_agent", json!({"prompt": "count files"}))],
            ),
            LlmResponse::text("3 files"),
            LlmResponse::text("The sub-agent found 3 files."),
        ]));
        let set = build_toolset(&config(SubAgentMode::Sync), provider.clone(), None)
            .await
            .unwrap();
        assert!(!set.tools.has("sub_agent_status"));

        let agent = set.agent(provider.clone());
        let mut conv = crate::agent_loop::Conversation::with_system(set.system_prompt());
        let answer = agent.run_prompt(&mut conv, "How many files?").await.unwrap();
        assert_eq!(answer, "The sub-agent found 3 files.");

        let tool_result = &conv.messages()[3];
        assert_eq!(tool_result.tool_call_id(), Some("s1"));
        assert!(tool_result.text().contains("\"result\": \"3 files\""));
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn test_mcp_tools_and_resources() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tools"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "uri": "calc://add",
                "name": "add",
                "description": "Add two numbers"
            }])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/resources/docs/style"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"content": "Use tabs."})))
            .mount(&server)
            .await;

        let mut config = config(SubAgentMode::Disabled);
        config.mcp.servers = vec![McpServerConfig {
            name: "local".into(),
            url: server.uri(),
            ..Default::default()
        }];
        config.mcp.default_tools = vec!["calc://add".into()];
        config.mcp.default_resources = vec!["docs://style".into()];

        let set = build_toolset(&config, mock(), None).await.unwrap();
        assert!(set.tools.has("list_mcp_servers"));
        assert!(set.tools.has("mcp_local_add"));
        assert!(set.system_prompt().contains("## Resource docs://style\n\nUse tabs."));
    }
}
