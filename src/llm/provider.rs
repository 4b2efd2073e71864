//! The provider abstraction.
//!
//! Any chat backend the pipeline can talk to, whether a cloud API or a
//! scripted stand-in for tests.

use async_trait::async_trait;

use super::types::ChatRequest;
use crate::error::LlmError;

/// The core trait for chat completions.
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    /// Send one request and return the reply text.
    ///
    /// Fails with a transport error on network or non-2xx failures, and with
    /// [`LlmError::EmptyReply`] when the provider returns no content.
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError>;
}
