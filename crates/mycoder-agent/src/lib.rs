//! MyCoder Agent: core loop, tools, MCP client and context builder.
//!
//! This crate contains:
//! - **tools**: Tool trait, the `ToolManager` registry, and built-in tools
//!   (filesystem, shell, think, sleep, user interaction, sub-agents)
//! - **mcp**: HTTP client for Model Context Protocol servers and the tools
//!   built on it
//! - **context**: System prompt construction
//! - **agent_loop**: The LLM ↔ tool-calling main loop
//! - **subagent**: Nested agent loops for delegated tasks
//! - **toolset**: Assembles all of the above from a `Config`

pub mod tools;
pub mod mcp;
pub mod context;
pub mod subagent;
pub mod agent_loop;
pub mod toolset;

pub use agent_loop::{AgentError, AgentLoop, CancelToken, Conversation, LoopConfig, RetryPolicy, TruncationPolicy};
pub use context::ContextBuilder;
pub use subagent::{JoinPolicy, SubagentManager, SubagentRequest, SubagentStatus};
pub use toolset::{build_toolset, Toolset};
pub use tools::{FunctionTool, RegistrationError, Tool, ToolError, ToolManager};
