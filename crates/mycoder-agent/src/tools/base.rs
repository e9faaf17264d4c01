//! Tool trait: the abstract interface every agent tool must implement.

use async_trait::async_trait;
use serde_json::{Map, Value};

use mycoder_core::schema::ToolSpec;

/// Arguments passed to a tool, as decoded from the model's tool call.
pub type ToolArgs = Map<String, Value>;

// ─────────────────────────────────────────────
// Tool trait
// ─────────────────────────────────────────────

/// Every agent tool implements this trait.
///
/// The [`super::ToolManager`] discovers tools via `name()`, renders their
/// schemas for the active provider via `spec()`, validates arguments against
/// `args_schema()` and dispatches calls via `execute()`.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name used by the LLM to call this tool (e.g. `"read_file"`).
    fn name(&self) -> &str;

    /// Human-readable description shown to the LLM.
    fn description(&self) -> &str;

    /// JSON Schema describing the arguments.
    ///
    /// Must be `{"type": "object", "properties": {...}, "required": [...]}`.
    fn args_schema(&self) -> Value;

    /// Optional JSON Schema describing the result.
    fn returns_schema(&self) -> Option<Value> {
        None
    }

    /// Execute the tool with already-validated arguments.
    ///
    /// Strings are handed to the model verbatim; other values are rendered
    /// as pretty JSON. Errors are wrapped by the manager.
    async fn execute(&self, args: ToolArgs) -> anyhow::Result<Value>;

    /// Vendor-neutral description sent to the provider.
    fn spec(&self) -> ToolSpec {
        ToolSpec::new(self.name(), self.description(), self.args_schema())
    }
}

// ─────────────────────────────────────────────
// Param helpers
// ─────────────────────────────────────────────

/// Extract a required `String` param, returning a user-friendly error.
pub fn require_string(args: &ToolArgs, key: &str) -> anyhow::Result<String> {
    args.get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow::anyhow!("Missing required parameter: {key}"))
}

/// Extract an optional `String` param.
pub fn optional_string(args: &ToolArgs, key: &str) -> Option<String> {
    args.get(key).and_then(|v| v.as_str()).map(|s| s.to_string())
}

/// Extract an optional integer param.
pub fn optional_i64(args: &ToolArgs, key: &str) -> Option<i64> {
    args.get(key).and_then(|v| v.as_i64())
}

/// Extract an optional number param, accepting integers too.
pub fn optional_f64(args: &ToolArgs, key: &str) -> Option<f64> {
    args.get(key).and_then(|v| v.as_f64())
}

/// Extract an optional boolean param (defaults to `false` if absent).
pub fn optional_bool(args: &ToolArgs, key: &str) -> bool {
    args.get(key).and_then(|v| v.as_bool()).unwrap_or(false)
}

/// Extract an optional list of strings. Non-string items are skipped.
pub fn optional_string_list(args: &ToolArgs, key: &str) -> Option<Vec<String>> {
    args.get(key).and_then(|v| v.as_array()).map(|items| {
        items
            .iter()
            .filter_map(|i| i.as_str().map(str::to_string))
            .collect()
    })
}

/// Render a tool result the way the model sees it.
pub fn render_output(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}
