//! LLM integration module.
//!
//! Provides an OpenAI-compatible client for LLM API calls and
//! the prompts used for relevance filtering and evaluation.

mod client;
mod prompts;

pub(crate) use client::ApiError;
pub use client::{ChatModel, LlmClient, extract_json};
pub use prompts::Prompts;
