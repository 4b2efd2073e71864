//! LLM layer: the chat completion collaborator.
//!
//! - Provider abstraction (`ChatCompletion`) and its request type
//! - OpenAI-compatible HTTP client (DeepSeek by default)
//! - Token budget accounting for one request

pub mod context;
pub mod openai;
pub mod provider;
pub mod types;

// Re-export key types
pub use context::{PackingBudget, TokenBudget};
pub use openai::OpenAiCompatClient;
pub use provider::ChatCompletion;
pub use types::{ChatRequest, Message, Role};
