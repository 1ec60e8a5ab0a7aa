use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::composer::{ComposeOutcome, Composed, Composer};
use crate::domain::{FailureKind, PipelineEvent};
use crate::messages;
use crate::ports::{DeliverySink, EventSink};
use crate::queue::{JobQueue, ServiceTimeEstimate};

/// Everything a worker needs besides the queue. Shared by all workers.
pub struct WorkerContext {
    pub composer: Arc<Composer>,
    pub delivery: Arc<dyn DeliverySink>,
    pub events: Arc<dyn EventSink>,
    pub estimate: Arc<ServiceTimeEstimate>,
    /// Wall-clock budget for one job.
    pub job_timeout: Duration,
}

/// Worker group handle.
/// - `request_shutdown` stops every worker from taking new jobs
/// - `join` waits for all workers to exit
pub struct WorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    /// Spawn `n` workers.
    pub fn spawn(n: usize, queue: Arc<dyn JobQueue>, ctx: Arc<WorkerContext>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut joins = Vec::with_capacity(n);
        for worker_id in 0..n {
            let q = Arc::clone(&queue);
            let ctx = Arc::clone(&ctx);
            let mut rx = shutdown_rx.clone();

            let join = tokio::spawn(async move {
                worker_loop(worker_id, q, ctx, &mut rx).await;
            });
            joins.push(join);
        }

        Self { shutdown_tx, joins }
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    /// Stop taking new jobs. A job already being composed runs to the end.
    pub fn request_shutdown(&self) {
        // receivers may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    /// Wait for every worker to exit.
    pub async fn join(self) {
        for j in self.joins {
            if let Err(err) = j.await {
                warn!(error = %err, "worker task ended abnormally");
            }
        }
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        self.join().await;
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: Arc<dyn JobQueue>,
    ctx: Arc<WorkerContext>,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    debug!(worker_id, "worker started");
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        // the queue wait is the only idle suspension point; race it with shutdown
        let lease = tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            lease = queue.lease() => lease,
        };

        // closed and drained
        let Some(lease) = lease else {
            break;
        };

        let job = lease.job().clone();
        ctx.events.emit(PipelineEvent::JobStarted {
            job: job.id,
            worker: worker_id,
        });

        let started = Instant::now();
        let deadline = started + ctx.job_timeout;
        // verification stops at the deadline on its own; the timeout only
        // fires when the draft itself is late, and drops its calls
        let composed = match tokio::time::timeout_at(deadline, ctx.composer.answer_by(&job, deadline)).await {
            Ok(composed) => composed,
            Err(_) => {
                warn!(worker_id, job = %job.id, timeout = ?ctx.job_timeout, "job timed out");
                Composed {
                    text: messages::friendly_error(FailureKind::Timeout, job.lang).to_string(),
                    outcome: ComposeOutcome::Failed(FailureKind::Timeout),
                }
            }
        };
        let elapsed = started.elapsed();
        ctx.estimate.observe(elapsed);

        ctx.delivery.deliver(&job.target_id, &composed.text).await;

        let state = composed.outcome.job_state();
        lease.finish(state).await;
        ctx.events.emit(PipelineEvent::JobFinished {
            job: job.id,
            state,
            elapsed,
            chars: composed.text.chars().count(),
        });
        info!(
            worker_id,
            job = %job.id,
            ?state,
            outcome = ?composed.outcome,
            elapsed_ms = elapsed.as_millis() as u64,
            "job finished"
        );
    }
    debug!(worker_id, "worker stopped");
}
