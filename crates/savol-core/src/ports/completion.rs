//! Completion port - the language-model service.
//!
//! One call is `{system prompt, messages} -> text`. Implementations must build
//! a fresh HTTP request on every call: the retrier calls `complete` again
//! instead of replaying a request.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::UpstreamError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// What is sent to the completion service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub system_prompt: String,
    /// Conversation history followed by the current user turn.
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
}

impl CompletionRequest {
    /// Text of the last user turn.
    pub fn user_text(&self) -> &str {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("")
    }
}

#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, UpstreamError>;
}
