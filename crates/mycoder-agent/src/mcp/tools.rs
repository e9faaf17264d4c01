//! Agent tools backed by MCP servers.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::tools::base::{optional_string, require_string, Tool, ToolArgs};
use crate::tools::{RegistrationError, ToolManager};

use super::{McpError, McpResource, McpSource, McpToolInfo};

/// Shared list of configured servers.
pub type McpSources = Arc<[Arc<dyn McpSource>]>;

/// Servers matching an optional `server` filter.
fn selected<'a>(
    sources: &'a McpSources,
    server: Option<&'a str>,
) -> impl Iterator<Item = &'a Arc<dyn McpSource>> + 'a {
    sources
        .iter()
        .filter(move |s| server.map_or(true, |name| s.name() == name))
}

fn server_property() -> Value {
    json!({
        "type": "string",
        "description": "Name of the server (all servers when omitted)"
    })
}

// ─────────────────────────────────────────────
// list_mcp_servers
// ─────────────────────────────────────────────

pub struct ListMcpServersTool {
    sources: McpSources,
}

#[async_trait]
impl Tool for ListMcpServersTool {
    fn name(&self) -> &str {
        "list_mcp_servers"
    }

    fn description(&self) -> &str {
        "List all configured MCP servers"
    }

    fn args_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _args: ToolArgs) -> anyhow::Result<Value> {
        let servers: Vec<Value> = self
            .sources
            .iter()
            .map(|s| json!({ "name": s.name(), "url": s.url() }))
            .collect();
        Ok(Value::Array(servers))
    }
}

// ─────────────────────────────────────────────
// list_mcp_resources
// ─────────────────────────────────────────────

pub struct ListMcpResourcesTool {
    sources: McpSources,
}

#[async_trait]
impl Tool for ListMcpResourcesTool {
    fn name(&self) -> &str {
        "list_mcp_resources"
    }

    fn description(&self) -> &str {
        "List resources available from MCP servers"
    }

    fn args_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "server": server_property() }
        })
    }

    async fn execute(&self, args: ToolArgs) -> anyhow::Result<Value> {
        let server = optional_string(&args, "server");
        let mut resources = Vec::new();
        for source in selected(&self.sources, server.as_deref()) {
            match source.list_resources().await {
                Ok(list) => resources.extend(list.into_iter().map(|mut r| {
                    if let Some(obj) = r.as_object_mut() {
                        obj.insert("server".into(), json!(source.name()));
                    }
                    r
                })),
                Err(e) => warn!(server = source.name(), error = %e, "skipping MCP server"),
            }
        }
        Ok(Value::Array(resources))
    }
}

// ─────────────────────────────────────────────
// get_mcp_resource
// ─────────────────────────────────────────────

pub struct GetMcpResourceTool {
    sources: McpSources,
}

#[async_trait]
impl Tool for GetMcpResourceTool {
    fn name(&self) -> &str {
        "get_mcp_resource"
    }

    fn description(&self) -> &str {
        "Get a resource from an MCP server"
    }

    fn args_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "uri": {
                    "type": "string",
                    "description": "URI of the resource (scheme://path)"
                },
                "server": server_property()
            },
            "required": ["uri"]
        })
    }

    async fn execute(&self, args: ToolArgs) -> anyhow::Result<Value> {
        let uri = require_string(&args, "uri")?;
        let server = optional_string(&args, "server");
        for source in selected(&self.sources, server.as_deref()) {
            match source.get_resource(&uri).await {
                Ok(resource) => {
                    return Ok(json!({
                        "uri": resource.uri,
                        "content": resource.content,
                        "metadata": resource.metadata,
                        "server": source.name(),
                    }))
                }
                Err(e @ McpError::InvalidUri(_)) => return Err(e.into()),
                Err(e) => warn!(server = source.name(), error = %e, "resource not available"),
            }
        }
        anyhow::bail!("Resource not found: {uri}")
    }
}

// ─────────────────────────────────────────────
// list_mcp_tools
// ─────────────────────────────────────────────

pub struct ListMcpToolsTool {
    sources: McpSources,
}

#[async_trait]
impl Tool for ListMcpToolsTool {
    fn name(&self) -> &str {
        "list_mcp_tools"
    }

    fn description(&self) -> &str {
        "List tools available from MCP servers"
    }

    fn args_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "server": server_property() }
        })
    }

    async fn execute(&self, args: ToolArgs) -> anyhow::Result<Value> {
        let server = optional_string(&args, "server");
        let mut tools = Vec::new();
        for source in selected(&self.sources, server.as_deref()) {
            match source.list_tools().await {
                Ok(list) => tools.extend(list.into_iter().map(|t| {
                    json!({
                        "uri": t.uri,
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                        "returns": t.returns,
                        "server": source.name(),
                    })
                })),
                Err(e) => warn!(server = source.name(), error = %e, "skipping MCP server"),
            }
        }
        Ok(Value::Array(tools))
    }
}

// ─────────────────────────────────────────────
// execute_mcp_tool
// ─────────────────────────────────────────────

pub struct ExecuteMcpToolTool {
    sources: McpSources,
}

#[async_trait]
impl Tool for ExecuteMcpToolTool {
    fn name(&self) -> &str {
        "execute_mcp_tool"
    }

    fn description(&self) -> &str {
        "Execute a tool on an MCP server"
    }

    fn args_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "uri": {
                    "type": "string",
                    "description": "URI of the tool (scheme://path)"
                },
                "params": {
                    "type": "object",
                    "description": "Parameters passed to the tool"
                },
                "server": server_property()
            },
            "required": ["uri"]
        })
    }

    async fn execute(&self, args: ToolArgs) -> anyhow::Result<Value> {
        let uri = require_string(&args, "uri")?;
        let server = optional_string(&args, "server");
        let params = args.get("params").cloned().unwrap_or_else(|| json!({}));
        for source in selected(&self.sources, server.as_deref()) {
            match source.execute_tool(&uri, params.clone()).await {
                Ok(result) => return Ok(json!({ "result": result, "server": source.name() })),
                Err(e @ McpError::InvalidUri(_)) => return Err(e.into()),
                Err(e) => warn!(server = source.name(), error = %e, "MCP tool not available"),
            }
        }
        anyhow::bail!("Tool not found: {uri}")
    }
}

/// The browsing tools for a set of servers.
pub fn mcp_tools(sources: McpSources) -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(ListMcpServersTool { sources: sources.clone() }),
        Arc::new(ListMcpResourcesTool { sources: sources.clone() }),
        Arc::new(GetMcpResourceTool { sources: sources.clone() }),
        Arc::new(ListMcpToolsTool { sources: sources.clone() }),
        Arc::new(ExecuteMcpToolTool { sources }),
    ]
}

// ─────────────────────────────────────────────
// McpRemoteTool
// ─────────────────────────────────────────────

/// One remote tool exposed to the model under `mcp_<server>_<name>`.
pub struct McpRemoteTool {
    name: String,
    description: String,
    info: McpToolInfo,
    source: Arc<dyn McpSource>,
}

impl McpRemoteTool {
    pub fn new(source: Arc<dyn McpSource>, info: McpToolInfo) -> Self {
        let name = remote_tool_name(source.name(), &info.name);
        let description = info
            .description
            .clone()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| format!("Remote tool {} on MCP server {}", info.uri, source.name()));
        Self {
            name,
            description,
            info,
            source,
        }
    }
}

/// Tool names are restricted to `[A-Za-z0-9_-]` by every vendor.
fn remote_tool_name(server: &str, tool: &str) -> String {
    format!("mcp_{server}_{tool}")
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

#[async_trait]
impl Tool for McpRemoteTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn args_schema(&self) -> Value {
        match &self.info.parameters {
            Some(schema) if schema.is_object() => schema.clone(),
            _ => json!({"type": "object", "properties": {}}),
        }
    }

    fn returns_schema(&self) -> Option<Value> {
        self.info.returns.clone()
    }

    async fn execute(&self, args: ToolArgs) -> anyhow::Result<Value> {
        Ok(self.source.execute_tool(&self.info.uri, Value::Object(args)).await?)
    }
}

/// Register every remote tool whose URI is listed in `uris`.
///
/// Unreachable servers and unknown URIs are logged and skipped; a name
/// clash with an existing tool is an error.
pub async fn register_default_tools(
    manager: &mut ToolManager,
    sources: &McpSources,
    uris: &[String],
) -> Result<usize, RegistrationError> {
    if uris.is_empty() {
        return Ok(0);
    }
    let mut registered = 0;
    let mut remaining: Vec<&String> = uris.iter().collect();
    for source in sources.iter() {
        let tools = match source.list_tools().await {
            Ok(tools) => tools,
            Err(e) => {
                warn!(server = source.name(), error = %e, "cannot list MCP tools");
                continue;
            }
        };
        for info in tools {
            let Some(pos) = remaining.iter().position(|u| **u == info.uri) else {
                continue;
            };
            remaining.remove(pos);
            let tool = McpRemoteTool::new(source.clone(), info);
            info!(tool = tool.name(), server = source.name(), "registering MCP tool");
            manager.register(Arc::new(tool))?;
            registered += 1;
        }
    }
    for uri in remaining {
        warn!(uri = %uri, "default MCP tool not found on any server");
    }
    Ok(registered)
}

/// Fetch resources for the system prompt, skipping any that fail.
pub async fn fetch_resources(sources: &McpSources, uris: &[String]) -> Vec<McpResource> {
    let mut out = Vec::new();
    for uri in uris {
        let mut found = false;
        for source in sources.iter() {
            if let Ok(resource) = source.get_resource(uri).await {
                out.push(resource);
                found = true;
                break;
            }
        }
        if !found {
            warn!(uri = %uri, "default MCP resource not found on any server");
        }
    }
    out
}
