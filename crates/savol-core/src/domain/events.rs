//! Pipeline events published to the outbound event channel.
//!
//! The pipeline never waits on the consumer; see `ports::EventSink`.

use std::time::Duration;

use super::ids::JobId;
use crate::queue::JobState;

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    JobQueued { job: JobId, position: usize },
    JobStarted { job: JobId, worker: usize },
    CacheHit { job: JobId },
    /// Search was wanted but unavailable or empty; answered without it.
    SearchDegraded { job: JobId },
    Verified { job: JobId, corrected: bool },
    JobFinished {
        job: JobId,
        state: JobState,
        elapsed: Duration,
        chars: usize,
    },
}

impl PipelineEvent {
    pub fn job(&self) -> JobId {
        match self {
            PipelineEvent::JobQueued { job, .. }
            | PipelineEvent::JobStarted { job, .. }
            | PipelineEvent::CacheHit { job }
            | PipelineEvent::SearchDegraded { job }
            | PipelineEvent::Verified { job, .. }
            | PipelineEvent::JobFinished { job, .. } => *job,
        }
    }
}
