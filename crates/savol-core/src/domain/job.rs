//! Job: one unit of question-answering work.

use serde::{Deserialize, Serialize};

use super::ids::{JobId, SessionId, TargetId};
use super::lang::Lang;

/// A question that already passed moderation and entitlement checks.
///
/// Owned by the queue until a worker claims it, then by that worker until it
/// reaches a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub session_id: SessionId,
    pub target_id: TargetId,
    pub question: String,
    pub lang: Lang,

    /// Free-text style guidance appended to the system prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_hint: Option<String>,

    /// Search augmentation is mandatory regardless of the heuristic.
    #[serde(default)]
    pub require_search: bool,

    /// Answer only from allowlisted sources, with citations.
    #[serde(default)]
    pub citation_required: bool,
}

impl Job {
    /// Create a job; the language is detected from the question.
    pub fn new(
        session_id: impl Into<String>,
        target_id: impl Into<String>,
        question: impl Into<String>,
    ) -> Self {
        let question = question.into();
        Self {
            id: JobId::generate(),
            session_id: SessionId::new(session_id),
            target_id: TargetId::new(target_id),
            lang: Lang::detect(&question),
            question,
            topic_hint: None,
            require_search: false,
            citation_required: false,
        }
    }

    pub fn with_lang(mut self, lang: Lang) -> Self {
        self.lang = lang;
        self
    }

    pub fn with_topic_hint(mut self, hint: impl Into<String>) -> Self {
        self.topic_hint = Some(hint.into());
        self
    }

    pub fn with_required_search(mut self) -> Self {
        self.require_search = true;
        self
    }

    pub fn with_citations(mut self) -> Self {
        self.citation_required = true;
        self
    }
}
