//! Boundary to the language-model client.
//!
//! The engine treats a completion like any other plugin action; the
//! `completion` bundled plugin adapts this trait to [`PluginAction`].
//!
//! [`PluginAction`]: crate::action::PluginAction

use std::time::Duration;

use {
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Conversation history the client may load; opaque here.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_ref: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,
    pub model: String,
}

#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },

    #[error("request rejected: {message}")]
    InvalidRequest { message: String },

    #[error("network error: {0}")]
    Network(#[source] anyhow::Error),
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, CompletionError>;
}

/// Replies with the last user message. Used by `switchyard demo`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoCompletionClient;

#[async_trait]
impl CompletionClient for EchoCompletionClient {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, CompletionError> {
        let last = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == ChatRole::User)
            .ok_or_else(|| CompletionError::InvalidRequest {
                message: "no user message".into(),
            })?;
        Ok(Completion {
            text: last.content.clone(),
            model: request.model,
        })
    }
}
