//! Tool modules for the MyCoder agent.

pub mod base;
pub mod error;
pub mod function;
pub mod registry;
pub mod filesystem;
pub mod shell;
pub mod think;
pub mod sleep;
pub mod user;
pub mod sub_agent;

pub use base::{Tool, ToolArgs, require_string, optional_string, optional_i64, optional_bool};
pub use error::{RegistrationError, ToolError};
pub use function::FunctionTool;
pub use registry::ToolManager;
