//! LLM provider layer for MyCoder.
//!
//! # Architecture
//!
//! - [`traits::LlmProvider`]: trait that all providers implement
//! - [`adapter::ProviderAdapter`]: pure per-vendor translation (request
//!   body, response parsing, error classification)
//! - [`http_provider::HttpProvider`]: the single HTTP client, generic over
//!   an adapter
//! - [`openai`], [`anthropic`], [`ollama`]: the three adapters
//! - [`registry`]: static provider specs, context windows and
//!   [`registry::create_provider`]
//! - [`tokens`]: token counting
//! - [`mock`]: scripted provider for tests

pub mod adapter;
pub mod anthropic;
pub mod http_provider;
pub mod mock;
pub mod ollama;
pub mod openai;
pub mod registry;
pub mod tokens;
pub mod traits;

// Re-export main types for convenience
pub use http_provider::HttpProvider;
pub use registry::{create_provider, ProviderSpec, PROVIDERS};
pub use traits::{LlmProvider, LlmRequestConfig};
