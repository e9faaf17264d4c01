//! ToolManager: the registry the agent loop dispatches tool calls through.
//!
//! Tools are stored as `Arc<dyn Tool>` alongside their compiled argument
//! validator, so a manager can be cloned cheaply and shared with sub-agents.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use jsonschema::JSONSchema;
use serde_json::Value;
use tracing::{debug, info, warn};

use mycoder_core::schema::{shape_for, ProviderKind, ToolSpec};
use mycoder_core::types::{Message, ToolCall};
use mycoder_core::utils::truncate_string;

use super::base::{render_output, Tool, ToolArgs};
use super::error::{RegistrationError, ToolError};

#[derive(Clone)]
struct RegisteredTool {
    tool: Arc<dyn Tool>,
    validator: Arc<JSONSchema>,
}

// ─────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────

/// Stores tools keyed by name, validates arguments and dispatches calls.
#[derive(Clone, Default)]
pub struct ToolManager {
    tools: HashMap<String, RegisteredTool>,
}

impl ToolManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool.
    ///
    /// Rejects duplicate names, empty names or descriptions, and argument
    /// schemas that are not valid JSON Schema objects.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), RegistrationError> {
        let name = tool.name().to_string();
        let invalid = |reason: String| RegistrationError::Invalid {
            name: name.clone(),
            reason,
        };

        if name.trim().is_empty() {
            return Err(invalid("empty name".into()));
        }
        if tool.description().trim().is_empty() {
            return Err(invalid("empty description".into()));
        }
        if self.tools.contains_key(&name) {
            return Err(RegistrationError::Duplicate { name: name.clone() });
        }

        let raw = tool.args_schema();
        if !raw.is_object() {
            return Err(invalid("argument schema must be a JSON object".into()));
        }
        let schema = tool.spec().parameters;
        let validator = JSONSchema::compile(&schema)
            .map_err(|e| invalid(format!("argument schema does not compile: {e}")))?;

        info!(tool = %name, "registered tool");
        self.tools.insert(
            name,
            RegisteredTool {
                tool,
                validator: Arc::new(validator),
            },
        );
        Ok(())
    }

    /// Register several tools, stopping at the first failure.
    pub fn register_all(
        &mut self,
        tools: impl IntoIterator<Item = Arc<dyn Tool>>,
    ) -> Result<(), RegistrationError> {
        for tool in tools {
            self.register(tool)?;
        }
        Ok(())
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Tool>, ToolError> {
        self.tools
            .get(name)
            .map(|r| r.tool.clone())
            .ok_or_else(|| ToolError::UnknownTool {
                name: name.to_string(),
            })
    }

    /// Check if a tool is registered.
    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Names of all registered tools, sorted for determinism.
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Vendor-neutral specs of all tools, ordered by name.
    pub fn specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self.tools.values().map(|r| r.tool.spec()).collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    /// Tool payloads in the envelope `kind` expects, ordered by name.
    pub fn schemas_for(&self, kind: ProviderKind) -> Vec<Value> {
        let shape = shape_for(kind);
        self.specs().iter().map(|s| shape.render(s)).collect()
    }

    /// Validate `args` against the tool's argument schema.
    ///
    /// Every violation is reported, not just the first.
    pub fn validate(&self, name: &str, args: &ToolArgs) -> Result<(), ToolError> {
        let registered = self.tools.get(name).ok_or_else(|| ToolError::UnknownTool {
            name: name.to_string(),
        })?;
        let instance = Value::Object(args.clone());
        let result = registered.validator.validate(&instance);
        if let Err(errors) = result {
            let errors: Vec<String> = errors
                .map(|e| {
                    let path = e.instance_path.to_string();
                    if path.is_empty() {
                        e.to_string()
                    } else {
                        format!("{path}: {e}")
                    }
                })
                .collect();
            return Err(ToolError::ArgumentValidation {
                tool: name.to_string(),
                errors,
            });
        }
        Ok(())
    }

    /// Resolve, validate and run a tool.
    pub async fn execute(&self, name: &str, args: ToolArgs) -> Result<Value, ToolError> {
        let tool = self.get(name)?;
        self.validate(name, &args)?;

        debug!(tool = name, "executing tool");
        match tool.execute(args).await {
            Ok(value) => Ok(value),
            Err(e) => match e.downcast::<ToolError>() {
                Ok(tool_error) => Err(tool_error),
                Err(e) => Err(ToolError::execution(name, e)),
            },
        }
    }

    /// Run one model-issued call and turn the outcome into a tool-role
    /// message. Failures are rendered into the message, never returned.
    pub async fn execute_call(&self, call: &ToolCall, timeout: Option<Duration>) -> Message {
        if let Some(bad) = &call.malformed_arguments {
            let error = match self.get(&call.name) {
                Ok(_) => ToolError::ArgumentValidation {
                    tool: call.name.clone(),
                    errors: vec![format!(
                        "arguments are not a valid JSON object ({}): {}",
                        bad.error,
                        truncate_string(&bad.raw, 200)
                    )],
                },
                Err(e) => e,
            };
            warn!(tool = %call.name, call_id = %call.id, error = %error, "tool call rejected");
            return Message::tool_error(&call.id, error.to_string());
        }

        let fut = self.execute(&call.name, call.arguments.clone());
        let result = match timeout {
            Some(after) => match tokio::time::timeout(after, fut).await {
                Ok(result) => result,
                Err(_) => Err(ToolError::Timeout {
                    tool: call.name.clone(),
                    after,
                }),
            },
            None => fut.await,
        };

        match result {
            Ok(value) => Message::tool_result(&call.id, render_output(&value)),
            Err(e) => {
                warn!(tool = %call.name, call_id = %call.id, error = %e, "tool call failed");
                Message::tool_error(&call.id, e.to_string())
            }
        }
    }

    /// A manager restricted to `names`.
    pub fn subset<S: AsRef<str>>(&self, names: &[S]) -> Result<ToolManager, ToolError> {
        let mut tools = HashMap::new();
        for name in names {
            let name = name.as_ref();
            let registered = self.tools.get(name).ok_or_else(|| ToolError::UnknownTool {
                name: name.to_string(),
            })?;
            tools.insert(name.to_string(), registered.clone());
        }
        Ok(ToolManager { tools })
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the manager is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolManager")
            .field("tools", &self.tool_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mycoder_core::types::Role;
    use serde_json::json;

    /// Minimal test tool.
    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes input"
        }
        fn args_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": { "text": { "type": "string" } },
                "required": ["text"]
            })
        }
        async fn execute(&self, args: ToolArgs) -> anyhow::Result<Value> {
            Ok(args.get("text").cloned().unwrap_or(Value::Null))
        }
    }

    /// Tool that always fails.
    struct FailTool;

    #[async_trait]
    impl Tool for FailTool {
        fn name(&self) -> &str {
            "fail"
        }
        fn description(&self) -> &str {
            "Always fails"
        }
        fn args_schema(&self) -> Value {
            json!({"type": "object", "properties": {}})
        }
        async fn execute(&self, _args: ToolArgs) -> anyhow::Result<Value> {
            let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
            Err(anyhow::Error::new(io).context("opening secret"))
        }
    }

    /// Tool that takes a while.
    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }
        fn description(&self) -> &str {
            "Sleeps"
        }
        fn args_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, _args: ToolArgs) -> anyhow::Result<Value> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(json!("done"))
        }
    }

    fn manager() -> ToolManager {
        let mut m = ToolManager::new();
        m.register_all([
            Arc::new(EchoTool) as Arc<dyn Tool>,
            Arc::new(FailTool),
            Arc::new(SlowTool),
        ])
        .unwrap();
        m
    }

    fn args(value: Value) -> ToolArgs {
        value.as_object().cloned().unwrap()
    }

    fn call(name: &str, arguments: Value) -> ToolCall {
        ToolCall::new("call_1", name, arguments)
    }

    #[test]
    fn test_register_and_lookup() {
        let m = manager();
        assert_eq!(m.len(), 3);
        assert!(m.has("echo"));
        assert!(m.get("echo").is_ok());
        assert!(matches!(
            m.get("nope"),
            Err(ToolError::UnknownTool { ref name }) if name == "nope"
        ));
        assert_eq!(m.tool_names(), vec!["echo", "fail", "slow"]);
    }

    #[test]
    fn test_register_duplicate() {
        let mut m = manager();
        let err = m.register(Arc::new(EchoTool)).unwrap_err();
        assert_eq!(err, RegistrationError::Duplicate { name: "echo".into() });
    }

    #[test]
    fn test_register_invalid_schema() {
        struct BadSchema;

        #[async_trait]
        impl Tool for BadSchema {
            fn name(&self) -> &str {
                "bad"
            }
            fn description(&self) -> &str {
                "Bad schema"
            }
            fn args_schema(&self) -> Value {
                json!("not an object")
            }
            async fn execute(&self, _args: ToolArgs) -> anyhow::Result<Value> {
                Ok(Value::Null)
            }
        }

        let mut m = ToolManager::new();
        assert!(matches!(
            m.register(Arc::new(BadSchema)),
            Err(RegistrationError::Invalid { .. })
        ));
        assert!(m.is_empty());
    }

    #[test]
    fn test_schemas_for_is_sorted_and_stable() {
        let m = manager();
        let openai = m.schemas_for(ProviderKind::OpenAi);
        assert_eq!(openai.len(), 3);
        assert_eq!(openai[0]["type"], "function");
        assert_eq!(openai[0]["function"]["name"], "echo");
        assert_eq!(openai[2]["function"]["name"], "slow");
        assert_eq!(openai, m.schemas_for(ProviderKind::OpenAi));

        let anthropic = m.schemas_for(ProviderKind::Anthropic);
        assert_eq!(anthropic[0]["name"], "echo");
        assert_eq!(anthropic[0]["input_schema"]["required"], json!(["text"]));
        assert_eq!(anthropic[2]["input_schema"]["properties"], json!({}));
    }

    #[test]
    fn test_schema_round_trip() {
        let m = manager();
        for kind in [ProviderKind::OpenAi, ProviderKind::Anthropic, ProviderKind::Ollama] {
            let shape = shape_for(kind);
            let recovered: Vec<ToolSpec> = m
                .schemas_for(kind)
                .iter()
                .filter_map(|p| shape.extract(p))
                .collect();
            assert_eq!(recovered, m.specs());
        }
    }

    #[test]
    fn test_validation_lists_every_field() {
        let mut m = ToolManager::new();
        m.register(Arc::new(
            super::super::function::FunctionTool::builder("write")
                .description("Write")
                .param("path", "string", "Path", true)
                .param("content", "string", "Content", true)
                .param("append", "boolean", "Append", false)
                .handler(|_| async { Ok(Value::Null) })
                .build()
                .unwrap(),
        ))
        .unwrap();

        let err = m.validate("write", &args(json!({"append": "yes"}))).unwrap_err();
        match err {
            ToolError::ArgumentValidation { tool, errors } => {
                assert_eq!(tool, "write");
                assert!(errors.len() >= 3, "{errors:?}");
                let joined = errors.join("\n");
                assert!(joined.contains("path"));
                assert!(joined.contains("content"));
                assert!(joined.contains("/append"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(m.validate("write", &args(json!({"path": "a", "content": "b"}))).is_ok());
    }

    #[tokio::test]
    async fn test_execute_success() {
        let m = manager();
        let out = m.execute("echo", args(json!({"text": "hello"}))).await.unwrap();
        assert_eq!(out, json!("hello"));
    }

    #[tokio::test]
    async fn test_execute_wraps_errors_with_source() {
        let m = manager();
        let err = m.execute("fail", ToolArgs::new()).await.unwrap_err();
        match &err {
            ToolError::Execution { tool, message, source } => {
                assert_eq!(tool, "fail");
                assert!(message.contains("opening secret"));
                assert!(message.contains("denied"));
                assert!(source.downcast_ref::<std::io::Error>().is_some());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_execute_passes_tool_errors_through() {
        let mut m = ToolManager::new();
        m.register(Arc::new(
            super::super::function::FunctionTool::builder("nested")
                .description("Fails with a tool error")
                .handler(|_| async {
                    Err(ToolError::UnknownTool {
                        name: "inner".into(),
                    }
                    .into())
                })
                .build()
                .unwrap(),
        ))
        .unwrap();
        let err = m.execute("nested", ToolArgs::new()).await.unwrap_err();
        assert!(matches!(err, ToolError::UnknownTool { ref name } if name == "inner"));
    }

    #[tokio::test]
    async fn test_execute_call_renders_messages() {
        let m = manager();

        let ok = m.execute_call(&call("echo", json!({"text": "hi"})), None).await;
        assert_eq!(ok.role(), Role::Tool);
        assert_eq!(ok.tool_call_id(), Some("call_1"));
        assert_eq!(ok.text(), "hi");

        let unknown = m.execute_call(&call("ghost", json!({})), None).await;
        assert!(unknown.text().contains("Unknown tool 'ghost'"));
        assert!(matches!(unknown, Message::Tool { is_error: true, .. }));

        let invalid = m.execute_call(&call("echo", json!({})), None).await;
        assert!(invalid.text().contains("Invalid arguments"));
    }

    #[tokio::test]
    async fn test_execute_call_timeout() {
        let m = manager();
        let msg = m
            .execute_call(&call("slow", json!({})), Some(Duration::from_millis(20)))
            .await;
        assert!(msg.text().contains("timed out"));

        let msg = m
            .execute_call(&call("slow", json!({})), Some(Duration::from_secs(5)))
            .await;
        assert_eq!(msg.text(), "done");
    }

    #[tokio::test]
    async fn test_execute_call_rejects_unparsed_arguments() {
        let m = manager();
        // "slow" needs no arguments, so running it on an empty map would succeed.
        let bad = ToolCall::malformed("call_9", "slow", r#"{"path": "/etc", "#, "EOF while parsing");
        let msg = m.execute_call(&bad, None).await;
        assert!(matches!(msg, Message::Tool { is_error: true, .. }));
        assert!(msg.text().contains("Invalid arguments for 'slow'"));
        assert!(msg.text().contains("EOF while parsing"));
        assert!(msg.text().contains(r#"{"path": "/etc", "#));
        assert_ne!(msg.text(), "done");

        let ghost = ToolCall::malformed("call_10", "ghost", "{", "EOF");
        assert!(m.execute_call(&ghost, None).await.text().contains("Unknown tool 'ghost'"));
    }

    #[test]
    fn test_subset() {
        let m = manager();
        let sub = m.subset(&["echo", "slow"]).unwrap();
        assert_eq!(sub.tool_names(), vec!["echo", "slow"]);
        assert!(!sub.has("fail"));
        assert!(matches!(
            m.subset(&["echo", "missing"]),
            Err(ToolError::UnknownTool { ref name }) if name == "missing"
        ));
    }
}
