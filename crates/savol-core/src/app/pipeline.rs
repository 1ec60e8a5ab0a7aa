//! Pipeline: the running system owned by the caller.
//!
//! Constructed once by [`PipelineBuilder`](super::PipelineBuilder); holds the
//! queue, the workers and every piece of shared state. Nothing lives in a
//! global.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use crate::client::CompletionClient;
use crate::config::PipelineConfig;
use crate::domain::{Job, JobId, Lang, PipelineEvent};
use crate::error::SavolError;
use crate::messages;
use crate::observability::PipelineStats;
use crate::ports::EventSink;
use crate::queue::{JobQueue, eta};
use crate::worker::{WorkerContext, WorkerGroup};

/// What the caller should tell the user right after submitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Acknowledgement {
    /// Short queue: "working on it".
    Accepted,
    /// Long queue: position and estimated wait.
    Queued { position: usize, eta: Duration },
}

impl Acknowledgement {
    pub fn message(&self, lang: Lang) -> String {
        match self {
            Acknowledgement::Accepted => messages::accepted(lang).to_string(),
            Acknowledgement::Queued { position, eta } => messages::queued(lang, *position, *eta),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SubmitReceipt {
    pub job: JobId,
    /// Queue depth right after the push.
    pub position: usize,
    pub ack: Acknowledgement,
}

pub struct Pipeline {
    queue: Arc<dyn JobQueue>,
    workers: WorkerGroup,
    ctx: Arc<WorkerContext>,
    completion: Arc<CompletionClient>,
    events: Arc<dyn EventSink>,
    config: PipelineConfig,
}

impl Pipeline {
    pub(super) fn new(
        queue: Arc<dyn JobQueue>,
        workers: WorkerGroup,
        ctx: Arc<WorkerContext>,
        completion: Arc<CompletionClient>,
        events: Arc<dyn EventSink>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            queue,
            workers,
            ctx,
            completion,
            events,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Enqueue a job. The answer arrives later through the delivery sink.
    pub async fn submit(&self, job: Job) -> Result<SubmitReceipt, SavolError> {
        let id = job.id;
        let position = self.queue.enqueue(job).await?;
        self.events.emit(PipelineEvent::JobQueued { job: id, position });

        let ack = if position >= self.config.queue_notice_threshold {
            Acknowledgement::Queued {
                position,
                eta: self.eta_for(position),
            }
        } else {
            Acknowledgement::Accepted
        };
        debug!(job = %id, position, ?ack, "job submitted");
        Ok(SubmitReceipt {
            job: id,
            position,
            ack,
        })
    }

    /// Expected wait for a job at `position`, from the service-time average.
    pub fn eta_for(&self, position: usize) -> Duration {
        let avg = self
            .ctx
            .estimate
            .average()
            .unwrap_or_else(|| self.config.default_service_time());
        let (min, max) = self.config.eta_bounds();
        eta(position, self.config.worker_count, avg, min, max)
    }

    pub async fn stats(&self) -> PipelineStats {
        PipelineStats {
            counts: self.queue.counts().await,
            avg_service: self.ctx.estimate.average(),
            cached_answers: self.ctx.composer.cache().len(),
            free_model_permits: self.completion.available_permits(),
        }
    }

    /// Resolve once every submitted job has been delivered.
    pub async fn wait_idle(&self) {
        self.queue.wait_idle().await;
    }

    /// Stop accepting jobs, let the workers drain the queue, then join them.
    pub async fn shutdown(self) {
        self.queue.close().await;
        self.workers.join().await;
        let counts = self.queue.counts().await;
        info!(
            finished = counts.finished(),
            failed_delivered = counts.failed_delivered,
            "pipeline stopped"
        );
    }
}
