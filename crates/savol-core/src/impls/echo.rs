//! Offline completion backend: answers by repeating the question.

use async_trait::async_trait;

use crate::domain::UpstreamError;
use crate::ports::{CompletionBackend, CompletionRequest};

/// Used when no model API key is configured, so the pipeline still runs end
/// to end.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoBackend;

#[async_trait]
impl CompletionBackend for EchoBackend {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, UpstreamError> {
        Ok(format!("You asked: {}", request.user_text()))
    }
}
