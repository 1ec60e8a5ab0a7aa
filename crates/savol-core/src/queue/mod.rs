//! Job queue: state machine, FIFO in-memory implementation and the
//! service-time estimate that feeds queue-position notices.

mod eta;
mod memory;
mod state;

pub use eta::{ServiceTimeEstimate, eta};
pub use memory::InMemoryQueue;
pub use state::JobState;

use async_trait::async_trait;

use crate::domain::Job;
use crate::error::SavolError;
use crate::observability::QueueCounts;

/// A leased job. The worker owns it and must call `finish` exactly once.
///
/// The queue owns state transitions; the worker only reports which terminal
/// state the job reached.
#[async_trait]
pub trait JobLease: Send {
    fn job(&self) -> &Job;

    /// Record the terminal state.
    async fn finish(self: Box<Self>, outcome: JobState);
}

/// Queue port. In-memory today; this trait is the seam for another backend.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue a job and return the queue depth right after the push
    /// (1 = nothing ahead of it).
    async fn enqueue(&self, job: Job) -> Result<usize, SavolError>;

    /// Wait for the next job. `None` once the queue is closed and drained.
    async fn lease(&self) -> Option<Box<dyn JobLease>>;

    async fn counts(&self) -> QueueCounts;

    /// Refuse new jobs. Already queued jobs are still handed out.
    async fn close(&self);

    /// Resolve once nothing is queued or in progress.
    async fn wait_idle(&self);
}
