//! Model Context Protocol integration.
//!
//! - [`McpSource`]: the contract a remote context server satisfies
//! - [`client::McpClient`]: HTTP implementation with bearer/basic auth
//! - [`tools`]: agent tools that browse servers, plus [`tools::McpRemoteTool`]
//!   which exposes one remote tool as a local one

pub mod client;
pub mod tools;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use client::McpClient;
pub use tools::{fetch_resources, mcp_tools, register_default_tools, McpRemoteTool, McpSources};

/// Failure talking to an MCP server.
#[derive(Debug, Error)]
pub enum McpError {
    #[error("Invalid MCP URI '{0}' (expected scheme://path)")]
    InvalidUri(String),

    #[error("MCP server '{server}' returned {status}: {body}")]
    Http {
        server: String,
        status: u16,
        body: String,
    },

    #[error("Error connecting to MCP server '{server}': {message}")]
    Transport { server: String, message: String },

    #[error("Unexpected response from MCP server '{server}': {message}")]
    Decode { server: String, message: String },
}

/// One resource fetched from a server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct McpResource {
    pub uri: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// A tool advertised by a server.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct McpToolInfo {
    pub uri: String,
    pub name: String,
    pub description: Option<String>,
    pub parameters: Option<Value>,
    pub returns: Option<Value>,
}

/// Split `scheme://path` into its two halves.
pub fn split_uri(uri: &str) -> Result<(&str, &str), McpError> {
    match uri.split_once("://") {
        Some((scheme, path)) if !scheme.is_empty() && !path.is_empty() => Ok((scheme, path)),
        _ => Err(McpError::InvalidUri(uri.to_string())),
    }
}

/// A remote source of resources and tools.
#[async_trait]
pub trait McpSource: Send + Sync {
    /// Configured server name.
    fn name(&self) -> &str;

    fn url(&self) -> &str;

    /// Resource listing as the server returns it.
    async fn list_resources(&self) -> Result<Vec<Value>, McpError>;

    async fn get_resource(&self, uri: &str) -> Result<McpResource, McpError>;

    async fn list_tools(&self) -> Result<Vec<McpToolInfo>, McpError>;

    async fn execute_tool(&self, uri: &str, params: Value) -> Result<Value, McpError>;
}
