//! OpenAI-compatible chat completions client.
//!
//! Works with DeepSeek (the default), OpenAI, and any endpoint that follows
//! the `POST /chat/completions` format.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::provider::ChatCompletion;
use super::types::{ChatRequest, Message};
use crate::error::LlmError;

/// Default endpoint base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.deepseek.com/v1";

/// Client configuration and state.
pub struct OpenAiCompatClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAiCompatClient {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Full URL of the completions endpoint.
    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl ChatCompletion for OpenAiCompatClient {
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let body = ApiRequest {
            model: &request.model,
            messages: request.messages(),
            temperature: request.temperature,
            max_tokens: request.max_output_tokens,
        };

        let url = self.endpoint();
        debug!(url = %url, model = %request.model, "Sending chat completion request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Connection {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Chat completion request failed");
            return Err(LlmError::Api {
                status: status.as_u16(),
                body: error_text,
            });
        }

        let parsed: ApiResponse = response.json().await.map_err(|e| LlmError::ResponseParse {
            message: e.to_string(),
        })?;

        if let Some(usage) = &parsed.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Chat completion usage"
            );
        }

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(LlmError::EmptyReply)
    }
}

// -----------------------------------------------------------------------------
// Wire DTOs
// -----------------------------------------------------------------------------

#[derive(Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    temperature: f32,
    max_tokens: usize,
}

#[derive(Deserialize)]
struct ApiResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ApiResponseMessage,
}

#[derive(Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: usize,
    #[serde(default)]
    completion_tokens: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_shape() {
        let request = ChatRequest {
            system: "sys".into(),
            user: "hello".into(),
            max_output_tokens: 100,
            temperature: 0.2,
            model: "deepseek-chat".into(),
        };
        let body = ApiRequest {
            model: &request.model,
            messages: request.messages(),
            temperature: request.temperature,
            max_tokens: request.max_output_tokens,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["model"], "deepseek-chat");
        assert_eq!(value["max_tokens"], 100);
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][1]["content"], "hello");
    }

    #[test]
    fn test_response_without_usage() {
        let parsed: ApiResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":"hi"}}]}"#).unwrap();
        assert!(parsed.usage.is_none());
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("hi"));
    }

    #[test]
    fn test_endpoint_trims_slash() {
        let client = OpenAiCompatClient::new("k", "https://api.example.com/v1/");
        assert_eq!(client.endpoint(), "https://api.example.com/v1/chat/completions");
    }
}
