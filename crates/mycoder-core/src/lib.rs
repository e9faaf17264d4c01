//! MyCoder core: the conversation model, tool schema shapes, the provider
//! error taxonomy and configuration shared by every other crate.

pub mod config;
pub mod error;
pub mod schema;
pub mod types;
pub mod utils;
