//! History port - recent conversation turns for prompt building.

use async_trait::async_trait;

use super::completion::ChatMessage;
use crate::domain::SessionId;

/// Read-only, bounded window over a session's conversation.
#[async_trait]
pub trait HistoryProvider: Send + Sync {
    /// Most recent turns whose combined length stays within `max_chars`,
    /// oldest first.
    async fn recent_history(&self, session: &SessionId, max_chars: usize) -> Vec<ChatMessage>;
}

/// Provider for deployments without conversation memory.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHistory;

#[async_trait]
impl HistoryProvider for NoHistory {
    async fn recent_history(&self, _session: &SessionId, _max_chars: usize) -> Vec<ChatMessage> {
        Vec::new()
    }
}
