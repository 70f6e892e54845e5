//! LLM integration
//!
//! Provides:
//! - An OpenAI-compatible HTTP client for chat completions and embeddings
//! - The [`Generator`] boundary used by the orchestrator
//! - A compliance-prompt generator built on the client

mod client;
mod generator;
mod traits;

pub use client::{ChatMessage, LLMClient, LlmError, OpenAiCompatClient};
pub use generator::LlmGenerator;
pub use traits::*;
