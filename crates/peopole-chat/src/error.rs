//! Error types for the chat relay.

use peopole_core::error::PeopoleError;

/// Errors from the upstream completion path.
///
/// None of these reach the browser; the relay turns every one of them into
/// a fallback stream.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("upstream API key is not configured")]
    NotConfigured,
    #[error("upstream returned status {status}: {body}")]
    UpstreamStatus { status: u16, body: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        ChatError::Transport(err.to_string())
    }
}

impl From<ChatError> for PeopoleError {
    fn from(err: ChatError) -> Self {
        PeopoleError::Upstream(err.to_string())
    }
}
