//! Error types at the tool boundary.
//!
//! [`ToolError`] is conversational: the agent loop renders it into a
//! tool-role message and keeps going. [`RegistrationError`] is fatal and
//! only surfaces while the tool set is being assembled.

use std::time::Duration;

use thiserror::Error;

/// Failure while resolving, validating or running a tool.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool '{name}'")]
    UnknownTool { name: String },

    #[error("Invalid arguments for '{tool}': {}", .errors.join("; "))]
    ArgumentValidation { tool: String, errors: Vec<String> },

    #[error("Error executing '{tool}': {message}")]
    Execution {
        tool: String,
        message: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Tool '{tool}' timed out after {}s", .after.as_secs_f64())]
    Timeout { tool: String, after: Duration },
}

impl ToolError {
    /// Name of the tool the error refers to.
    pub fn tool(&self) -> &str {
        match self {
            ToolError::UnknownTool { name } => name,
            ToolError::ArgumentValidation { tool, .. }
            | ToolError::Execution { tool, .. }
            | ToolError::Timeout { tool, .. } => tool,
        }
    }

    /// Wrap an arbitrary tool failure, keeping it as the source.
    pub fn execution(tool: impl Into<String>, source: anyhow::Error) -> Self {
        ToolError::Execution {
            tool: tool.into(),
            message: format!("{source:#}"),
            source,
        }
    }
}

/// Failure while adding a tool to a [`super::ToolManager`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("A tool named '{name}' is already registered")]
    Duplicate { name: String },

    #[error("Tool '{name}' is invalid: {reason}")]
    Invalid { name: String, reason: String },
}
