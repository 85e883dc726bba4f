//! OpenAI-compatible HTTP Client
//!
//! Talks to any server exposing `POST {base}/chat/completions` (mlx_lm.server,
//! llama.cpp, vLLM, Ollama's OpenAI shim). Uses reqwest directly rather than a
//! provider SDK since only non-streaming completions are needed.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error};

/// Default server base URL
pub const DEFAULT_API_BASE: &str = "http://localhost:8080/v1";

const COMPLETIONS_PATH: &str = "/chat/completions";

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("Server error (status {status}): {body}")]
    Status { status: u16, body: String },
    #[error("No choices in response")]
    EmptyChoices,
    #[error("Failed to decode response: {0}")]
    Deserialize(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        LlmError::Http(e.to_string())
    }
}

/// Chat message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Request body for `/chat/completions`
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    pub temperature: f32,
}

impl ChatRequest {
    pub fn new(model: &str, messages: Vec<ChatMessage>, temperature: f32) -> Self {
        Self {
            model: model.to_string(),
            messages,
            stream: false,
            temperature,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    pub message: ResponseMessage,
}

/// Message in a completion response. Servers disagree on role names and may send null content.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatResponse {
    /// Content of the first choice
    pub fn into_content(self) -> Result<String, LlmError> {
        self.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.unwrap_or_default())
            .ok_or(LlmError::EmptyChoices)
    }
}

/// Anything that can answer a chat completion request.
///
/// The pipeline only depends on this trait so tests can script replies.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError>;
}

/// HTTP backend for OpenAI-compatible servers
#[derive(Clone)]
pub struct OpenAiCompatClient {
    http: Client,
    endpoint: String,
}

impl OpenAiCompatClient {
    pub fn new(api_base: &str, request_timeout: Duration) -> Self {
        let http = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            http,
            endpoint: completions_endpoint(api_base),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Normalize a base URL to its `/chat/completions` endpoint
pub fn completions_endpoint(api_base: &str) -> String {
    let base = if api_base.trim().is_empty() { DEFAULT_API_BASE } else { api_base.trim() };
    if base.ends_with(COMPLETIONS_PATH) {
        base.to_string()
    } else {
        format!("{}{}", base.trim_end_matches('/'), COMPLETIONS_PATH)
    }
}

#[async_trait]
impl ChatBackend for OpenAiCompatClient {
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        debug!(endpoint = %self.endpoint, messages = request.messages.len(), "Sending chat completion");
        let resp = self.http.post(&self.endpoint).json(request).send().await?;

        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            error!(status = %status, body = %text, "Chat completion failed");
            return Err(LlmError::Status { status: status.as_u16(), body: text });
        }

        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| LlmError::Deserialize(format!("{}: {}", e, text)))?;
        parsed.into_content()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completions_endpoint() {
        assert_eq!(
            completions_endpoint("http://localhost:8080/v1"),
            "http://localhost:8080/v1/chat/completions"
        );
        assert_eq!(
            completions_endpoint("http://localhost:8080/v1/"),
            "http://localhost:8080/v1/chat/completions"
        );
        assert_eq!(
            completions_endpoint("http://host/v1/chat/completions"),
            "http://host/v1/chat/completions"
        );
        assert_eq!(completions_endpoint(""), "http://localhost:8080/v1/chat/completions");
    }

    #[test]
    fn test_request_serialization() {
        let request = ChatRequest::new(
            "test-model",
            vec![ChatMessage::system("sys"), ChatMessage::user("hi")],
            0.1,
        );
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["model"], "test-model");
        assert_eq!(value["stream"], false);
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][1]["content"], "hi");
    }

    #[test]
    fn test_response_first_choice() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"{}"}}]}"#;
        let resp: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(resp.into_content().unwrap(), "{}");
    }

    #[test]
    fn test_response_empty_choices() {
        let resp: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(resp.into_content(), Err(LlmError::EmptyChoices)));
    }
}
