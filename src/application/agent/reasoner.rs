use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ReasonerError {
    #[error("reasoning backend request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("reasoning backend returned an unusable response: {0}")]
    InvalidResponse(String),
}

/// The reasoning step the runtime loops over: given the transcript so far,
/// produce the next raw model utterance. One implementation calls a hosted
/// model; tests script the replies.
#[async_trait]
pub trait Reasoner: Send + Sync {
    async fn next_action(&self, messages: &[ChatMessage]) -> Result<String, ReasonerError>;
}
