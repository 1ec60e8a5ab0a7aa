//! Delivery port - hands a finished answer back to the chat transport.

use async_trait::async_trait;

use crate::domain::TargetId;

/// Best-effort, fire-and-forget from the pipeline's point of view.
///
/// Implementations log their own failures; nothing is reported back.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    async fn deliver(&self, target: &TargetId, text: &str);
}
