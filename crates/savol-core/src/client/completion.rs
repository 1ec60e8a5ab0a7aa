//! Rate-limited completion client.
//!
//! Every call goes through one process-wide semaphore, so at most N requests
//! are in flight against the model no matter how many workers run. The
//! client is a terminal boundary: failures come back as
//! [`Completion::Failed`] carrying a localized message, never as an error.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, instrument, warn};

use super::cleanup::{clean_answer, mentions_knowledge_cutoff};
use crate::domain::{FailureKind, Lang};
use crate::messages;
use crate::ports::{ChatMessage, CompletionBackend, CompletionRequest};
use crate::retry::{RetryPolicy, retry};

pub const DEFAULT_MODEL_CONCURRENCY: usize = 4;

/// Per-call knobs that do not belong to the prompt itself.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionOptions {
    pub lang: Lang,
    pub temperature: f32,
    /// Keep URLs and markdown links in the answer.
    pub allow_links: bool,
}

impl CompletionOptions {
    pub fn new(lang: Lang) -> Self {
        Self {
            lang,
            temperature: 0.6,
            allow_links: false,
        }
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn allow_links(mut self, allow: bool) -> Self {
        self.allow_links = allow;
        self
    }
}

/// Result of a completion call, already safe to show to a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Answer(String),
    /// The model leaned on its training cutoff. The disclaimer is already
    /// redacted from the text; callers with search may want a grounded retry.
    Hedged(String),
    Failed { kind: FailureKind, message: String },
}

impl Completion {
    /// The answer text, if the call succeeded with something non-empty.
    pub fn answer(&self) -> Option<&str> {
        match self {
            Completion::Answer(text) | Completion::Hedged(text) if !text.trim().is_empty() => {
                Some(text)
            }
            _ => None,
        }
    }

    pub fn is_hedged(&self) -> bool {
        matches!(self, Completion::Hedged(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Completion::Failed { .. })
    }
}

pub struct CompletionClient {
    backend: Arc<dyn CompletionBackend>,
    permits: Arc<Semaphore>,
    policy: RetryPolicy,
}

impl CompletionClient {
    pub fn new(backend: Arc<dyn CompletionBackend>, concurrency: usize, policy: RetryPolicy) -> Self {
        Self {
            backend,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            policy,
        }
    }

    /// Permits currently free; mostly for tests and status output.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    #[instrument(skip_all, fields(lang = options.lang.code(), history = history.len()))]
    pub async fn complete(
        &self,
        system_prompt: &str,
        history: &[ChatMessage],
        user_text: &str,
        options: CompletionOptions,
    ) -> Completion {
        let mut messages = history.to_vec();
        messages.push(ChatMessage::user(user_text));
        let request = CompletionRequest {
            system_prompt: system_prompt.to_string(),
            messages,
            temperature: options.temperature,
        };

        let result = {
            // released on drop, including when this future is cancelled
            let _permit = match self.permits.acquire().await {
                Ok(permit) => permit,
                Err(_) => {
                    warn!("completion semaphore closed");
                    return failed(FailureKind::Unavailable, options.lang);
                }
            };
            retry(&self.policy, || self.backend.complete(&request)).await
        };

        match result {
            Ok(raw) => {
                debug!(chars = raw.len(), "completion succeeded");
                let text = clean_answer(&raw, options.allow_links);
                if mentions_knowledge_cutoff(&raw) {
                    debug!("answer hedged on the knowledge cutoff");
                    Completion::Hedged(text)
                } else {
                    Completion::Answer(text)
                }
            }
            Err(err) => {
                let kind = err.failure_kind();
                warn!(error = %err, ?kind, "completion failed");
                failed(kind, options.lang)
            }
        }
    }
}

fn failed(kind: FailureKind, lang: Lang) -> Completion {
    Completion::Failed {
        kind,
        message: messages::friendly_error(kind, lang).to_string(),
    }
}
