//! Closure-backed tools.
//!
//! ```ignore
//! let tool = FunctionTool::builder("add")
//!     .description("Add two numbers")
//!     .param("a", "number", "First operand", true)
//!     .param("b", "number", "Second operand", true)
//!     .handler(|args| async move {
//!         let a = args.get("a").and_then(|v| v.as_f64()).unwrap_or(0.0);
//!         let b = args.get("b").and_then(|v| v.as_f64()).unwrap_or(0.0);
//!         Ok(json!(a + b))
//!     })
//!     .build()?;
//! ```

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use serde_json::{json, Map, Value};

use super::base::{Tool, ToolArgs};
use super::error::RegistrationError;

type Handler = Arc<dyn Fn(ToolArgs) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

/// A tool whose body is an async closure and whose schema is declared
/// up front.
#[derive(Clone)]
pub struct FunctionTool {
    name: String,
    description: String,
    schema: Value,
    returns: Option<Value>,
    handler: Handler,
}

impl std::fmt::Debug for FunctionTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionTool")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl FunctionTool {
    pub fn builder(name: impl Into<String>) -> FunctionToolBuilder {
        FunctionToolBuilder {
            name: name.into(),
            description: String::new(),
            properties: Map::new(),
            required: Vec::new(),
            schema: None,
            returns: None,
            handler: None,
        }
    }
}

#[async_trait]
impl Tool for FunctionTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn args_schema(&self) -> Value {
        self.schema.clone()
    }

    fn returns_schema(&self) -> Option<Value> {
        self.returns.clone()
    }

    async fn execute(&self, args: ToolArgs) -> anyhow::Result<Value> {
        (self.handler)(args).await
    }
}

// ─────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────

/// Builder for [`FunctionTool`].
///
/// Parameters are declared with [`param`](Self::param) or supplied whole
/// with [`schema`](Self::schema); an explicit schema wins.
pub struct FunctionToolBuilder {
    name: String,
    description: String,
    properties: Map<String, Value>,
    required: Vec<String>,
    schema: Option<Value>,
    returns: Option<Value>,
    handler: Option<Handler>,
}

impl FunctionToolBuilder {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Declare one parameter of a JSON Schema primitive type.
    pub fn param(
        mut self,
        name: impl Into<String>,
        json_type: &str,
        description: impl Into<String>,
        required: bool,
    ) -> Self {
        let name = name.into();
        self.properties.insert(
            name.clone(),
            json!({ "type": json_type, "description": description.into() }),
        );
        if required {
            self.required.push(name);
        }
        self
    }

    /// Use a complete argument schema instead of declared parameters.
    pub fn schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn returns(mut self, schema: Value) -> Self {
        self.returns = Some(schema);
        self
    }

    pub fn handler<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(ToolArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.handler = Some(Arc::new(move |args| handler(args).boxed()));
        self
    }

    pub fn build(self) -> Result<FunctionTool, RegistrationError> {
        let invalid = |reason: &str| RegistrationError::Invalid {
            name: self.name.clone(),
            reason: reason.to_string(),
        };
        let handler = self.handler.clone().ok_or_else(|| invalid("no handler"))?;
        let schema = match self.schema {
            Some(schema) => schema,
            None => json!({
                "type": "object",
                "properties": self.properties,
                "required": self.required,
            }),
        };
        Ok(FunctionTool {
            name: self.name,
            description: self.description,
            schema,
            returns: self.returns,
            handler,
        })
    }
}
