//! HTTP client for one MCP server.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error};

use mycoder_core::config::schema::{McpAuthType, McpServerConfig};

use super::{split_uri, McpError, McpResource, McpSource, McpToolInfo};

/// Talks to an MCP server over plain HTTP + JSON.
pub struct McpClient {
    config: McpServerConfig,
    client: reqwest::Client,
}

impl McpClient {
    pub fn new(config: McpServerConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { config, client }
    }

    fn base_url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    /// `Authorization` header derived from the configured credentials.
    fn auth_headers(&self) -> HeaderMap {
        let auth = &self.config.auth;
        let value = match auth.auth_type {
            McpAuthType::Bearer => auth.token.as_ref().map(|t| format!("Bearer {t}")),
            McpAuthType::Basic => match (&auth.username, &auth.password) {
                (Some(user), Some(pass)) => {
                    Some(format!("Basic {}", BASE64.encode(format!("{user}:{pass}"))))
                }
                _ => None,
            },
        };

        let mut headers = HeaderMap::new();
        if let Some(value) = value.and_then(|v| HeaderValue::from_str(&v).ok()) {
            headers.insert(AUTHORIZATION, value);
        }
        headers
    }

    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T, McpError> {
        let server = self.config.name.clone();
        let response = request.headers(self.auth_headers()).send().await.map_err(|e| {
            error!(server = %server, error = %e, "MCP request failed");
            McpError::Transport {
                server: server.clone(),
                message: e.to_string(),
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(McpError::Http {
                server,
                status: status.as_u16(),
                body,
            });
        }
        response.json::<T>().await.map_err(|e| McpError::Decode {
            server,
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl McpSource for McpClient {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn url(&self) -> &str {
        &self.config.url
    }

    async fn list_resources(&self) -> Result<Vec<Value>, McpError> {
        let url = format!("{}/resources", self.base_url());
        debug!(server = %self.config.name, "listing MCP resources");
        self.send(self.client.get(url)).await
    }

    async fn get_resource(&self, uri: &str) -> Result<McpResource, McpError> {
        let (scheme, path) = split_uri(uri)?;
        let url = format!("{}/resources/{scheme}/{path}", self.base_url());
        let data: Value = self.send(self.client.get(url)).await?;
        Ok(McpResource {
            uri: uri.to_string(),
            content: data
                .get("content")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            metadata: data.get("metadata").filter(|m| !m.is_null()).cloned(),
        })
    }

    async fn list_tools(&self) -> Result<Vec<McpToolInfo>, McpError> {
        let url = format!("{}/tools", self.base_url());
        debug!(server = %self.config.name, "listing MCP tools");
        self.send(self.client.get(url)).await
    }

    async fn execute_tool(&self, uri: &str, params: Value) -> Result<Value, McpError> {
        let (scheme, path) = split_uri(uri)?;
        let url = format!("{}/tools/{scheme}/{path}", self.base_url());
        let params = if params.is_null() { serde_json::json!({}) } else { params };
        debug!(server = %self.config.name, uri, "executing MCP tool");
        self.send(self.client.post(url).json(&params)).await
    }
}
