use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Number of jobs per state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub queued: usize,
    pub in_progress: usize,
    pub done: usize,
    pub failed_delivered: usize,
}

impl QueueCounts {
    /// Jobs that reached a terminal state.
    pub fn finished(&self) -> usize {
        self.done + self.failed_delivered
    }
}

/// Point-in-time view of the pipeline, for status output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineStats {
    pub counts: QueueCounts,
    /// Smoothed service time; `None` until the first job finishes.
    pub avg_service: Option<Duration>,
    pub cached_answers: usize,
    pub free_model_permits: usize,
}
