//! In-process conversation history.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::SessionId;
use crate::ports::{ChatMessage, HistoryProvider};

pub const DEFAULT_MAX_TURNS: usize = 20;

/// Last `max_turns` messages per session, kept in memory only.
#[derive(Debug)]
pub struct InMemoryHistory {
    sessions: Mutex<HashMap<SessionId, VecDeque<ChatMessage>>>,
    max_turns: usize,
}

impl InMemoryHistory {
    pub fn new(max_turns: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            max_turns: max_turns.max(1),
        }
    }

    pub fn append(&self, session: &SessionId, message: ChatMessage) {
        let mut sessions = self.sessions.lock().unwrap_or_else(|p| p.into_inner());
        let turns = sessions.entry(session.clone()).or_default();
        turns.push_back(message);
        while turns.len() > self.max_turns {
            turns.pop_front();
        }
    }

    pub fn reset(&self, session: &SessionId) {
        let mut sessions = self.sessions.lock().unwrap_or_else(|p| p.into_inner());
        sessions.remove(session);
    }
}

impl Default for InMemoryHistory {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TURNS)
    }
}

#[async_trait]
impl HistoryProvider for InMemoryHistory {
    async fn recent_history(&self, session: &SessionId, max_chars: usize) -> Vec<ChatMessage> {
        let sessions = self.sessions.lock().unwrap_or_else(|p| p.into_inner());
        let Some(turns) = sessions.get(session) else {
            return Vec::new();
        };

        // newest first until the budget is spent, then back to oldest first
        let mut total = 0;
        let mut picked: Vec<ChatMessage> = turns
            .iter()
            .rev()
            .take_while(|m| {
                total += m.content.chars().count();
                total <= max_chars
            })
            .cloned()
            .collect();
        picked.reverse();
        picked
    }
}
