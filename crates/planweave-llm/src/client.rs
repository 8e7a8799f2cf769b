//! Chat client abstraction
//!
//! A [`ChatClient`] takes a complete request and returns the assistant's
//! text. The HTTP implementation speaks the OpenAI chat-completions wire
//! shape; the mock replays scripted replies for tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while talking to a chat model.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Transport-level failure: connect, DNS, timeout.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("chat service returned {status}: {message}")]
    Response { status: u16, message: String },

    /// The response body did not have the expected shape.
    #[error("chat response not decodable: {0}")]
    Serialization(String),

    /// Every retry attempt failed.
    #[error("chat request failed after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
}

impl ChatError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ChatError::Http(_) => true,
            ChatError::Response { status, .. } => *status == 429 || *status >= 500,
            ChatError::Serialization(_) | ChatError::Exhausted { .. } => false,
        }
    }
}

/// One message in a chat exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// A complete chat request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub temperature: f32,
    pub messages: Vec<ChatMessage>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            temperature: 0.2,
            messages,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Something that can complete a chat request.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Send the request and return the assistant's reply text.
    async fn complete(&self, request: ChatRequest) -> Result<String, ChatError>;
}

#[async_trait]
impl<C: ChatClient + ?Sized> ChatClient for std::sync::Arc<C> {
    async fn complete(&self, request: ChatRequest) -> Result<String, ChatError> {
        (**self).complete(request).await
    }
}

/// Connection settings for [`OpenAiClient`].
#[derive(Debug, Clone)]
pub struct OpenAiClientConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for OpenAiClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            api_key: None,
            timeout_secs: 60,
        }
    }
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireMessage,
}

#[derive(Deserialize)]
struct WireMessage {
    content: String,
}

/// HTTP client for any OpenAI-compatible chat-completions endpoint.
pub struct OpenAiClient {
    config: OpenAiClientConfig,
    http: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(config: OpenAiClientConfig) -> Result<Self, ChatError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { config, http })
    }
}

#[async_trait]
impl ChatClient for OpenAiClient {
    async fn complete(&self, request: ChatRequest) -> Result<String, ChatError> {
        let body = WireRequest {
            model: &request.model,
            temperature: request.temperature,
            messages: &request.messages,
        };
        let mut http_request = self.http.post(&self.config.endpoint).json(&body);
        if let Some(key) = &self.config.api_key {
            http_request = http_request.bearer_auth(key);
        }

        let response = http_request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ChatError::Response {
                status: status.as_u16(),
                message,
            });
        }

        let decoded: WireResponse = response
            .json()
            .await
            .map_err(|e| ChatError::Serialization(e.to_string()))?;
        decoded
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| ChatError::Serialization("response contained no choices".to_string()))
    }
}

/// Scripted chat client for tests. Replies are consumed in order; running
/// past the script is a test bug and panics.
pub struct MockChatClient {
    replies: Mutex<VecDeque<Result<String, ChatError>>>,
}

impl MockChatClient {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
        }
    }

    /// Script a successful reply.
    pub fn reply(self, text: impl Into<String>) -> Self {
        self.replies.lock().unwrap().push_back(Ok(text.into()));
        self
    }

    /// Script a failure.
    pub fn fail(self, error: ChatError) -> Self {
        self.replies.lock().unwrap().push_back(Err(error));
        self
    }
}

impl Default for MockChatClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatClient for MockChatClient {
    async fn complete(&self, _request: ChatRequest) -> Result<String, ChatError> {
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("mock chat client ran out of scripted replies")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ChatError::Response {
            status: 429,
            message: String::new()
        }
        .is_transient());
        assert!(ChatError::Response {
            status: 503,
            message: String::new()
        }
        .is_transient());
        assert!(!ChatError::Response {
            status: 401,
            message: String::new()
        }
        .is_transient());
        assert!(!ChatError::Serialization("bad".to_string()).is_transient());
    }

    #[tokio::test]
    async fn test_mock_replays_in_order() {
        let mock = MockChatClient::new().reply("first").reply("second");
        let request = ChatRequest::new("test-model", vec![ChatMessage::user("hi")]);
        assert_eq!(mock.complete(request.clone()).await.unwrap(), "first");
        assert_eq!(mock.complete(request).await.unwrap(), "second");
    }
}
