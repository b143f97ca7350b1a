//! Streaming client for the OpenAI-compatible completion endpoint.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::Serialize;
use tracing::debug;

use peopole_core::config::UpstreamConfig;
use peopole_core::types::ChatMessage;

use crate::error::ChatError;

/// Raw response body of a streaming completion.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ChatError>> + Send>>;

/// One message in the upstream wire format.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WireMessage {
    pub role: String,
    pub content: String,
}

impl From<&ChatMessage> for WireMessage {
    fn from(message: &ChatMessage) -> Self {
        Self {
            role: message.role.as_str().to_string(),
            content: message.content.clone(),
        }
    }
}

/// Body of `POST /chat/completions`.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    pub stream: bool,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
}

impl CompletionRequest {
    /// A streaming request with `system` placed ahead of `conversation`.
    pub fn new(config: &UpstreamConfig, system: String, conversation: &[ChatMessage]) -> Self {
        let mut messages = Vec::with_capacity(conversation.len() + 1);
        messages.push(WireMessage {
            role: "system".to_string(),
            content: system,
        });
        messages.extend(conversation.iter().map(WireMessage::from));

        Self {
            model: config.model.clone(),
            messages,
            stream: true,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            top_p: config.top_p,
        }
    }
}

/// A source of streamed completions.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Whether credentials are present. An unconfigured provider always
    /// fails with [`ChatError::NotConfigured`].
    fn is_configured(&self) -> bool;

    /// Start a completion and return its body once the response status is
    /// known to be successful.
    async fn open_stream(&self, request: CompletionRequest) -> Result<ByteStream, ChatError>;
}

/// Groq (or any OpenAI-compatible) chat completions over HTTPS.
pub struct GroqProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl GroqProvider {
    pub fn new(config: &UpstreamConfig) -> Result<Self, ChatError> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        Ok(Self {
            client: builder.build()?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config
                .api_key
                .clone()
                .filter(|key| !key.trim().is_empty()),
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl CompletionProvider for GroqProvider {
    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn open_stream(&self, request: CompletionRequest) -> Result<ByteStream, ChatError> {
        let api_key = self.api_key.as_deref().ok_or(ChatError::NotConfigured)?;

        debug!(
            model = %request.model,
            messages = request.messages.len(),
            "Opening upstream completion stream"
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }

        Ok(Box::pin(
            response
                .bytes_stream()
                .map(|chunk| chunk.map_err(|e| ChatError::Transport(e.to_string()))),
        ))
    }
}
