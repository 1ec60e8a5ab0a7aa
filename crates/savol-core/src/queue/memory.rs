//! In-memory FIFO job queue.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use super::{JobLease, JobQueue, JobState};
use crate::domain::{Job, JobId};
use crate::error::SavolError;
use crate::observability::QueueCounts;

#[derive(Default)]
struct InMemoryQueueState {
    /// Jobs waiting for a worker, oldest first.
    ready: VecDeque<Job>,

    /// Jobs leased and not yet finished. Finished jobs are forgotten; only
    /// the terminal counters below remember them.
    in_progress: HashSet<JobId>,

    done: usize,
    failed_delivered: usize,

    closed: bool,
}

impl InMemoryQueueState {
    fn counts(&self) -> QueueCounts {
        QueueCounts {
            queued: self.ready.len(),
            in_progress: self.in_progress.len(),
            done: self.done,
            failed_delivered: self.failed_delivered,
        }
    }

    fn is_idle(&self) -> bool {
        self.ready.is_empty() && self.in_progress.is_empty()
    }
}

/// Unbounded in-memory queue. Lock sections never span an `.await`.
pub struct InMemoryQueue {
    state: Arc<Mutex<InMemoryQueueState>>,
    notify: Arc<Notify>,
    /// Woken whenever a lease finishes; used by `wait_idle`.
    finished: Arc<Notify>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(InMemoryQueueState::default())),
            notify: Arc::new(Notify::new()),
            finished: Arc::new(Notify::new()),
        }
    }

    /// State of a job the queue still holds; `None` once it has finished.
    #[cfg(test)]
    pub(crate) async fn state_of(&self, id: JobId) -> Option<JobState> {
        let state = self.state.lock().await;
        if state.in_progress.contains(&id) {
            Some(JobState::InProgress)
        } else if state.ready.iter().any(|job| job.id == id) {
            Some(JobState::Queued)
        } else {
            None
        }
    }
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobQueue for InMemoryQueue {
    async fn enqueue(&self, job: Job) -> Result<usize, SavolError> {
        let position = {
            let mut state = self.state.lock().await;
            if state.closed {
                return Err(SavolError::Closed);
            }
            state.ready.push_back(job);
            state.ready.len()
        };
        self.notify.notify_one();
        Ok(position)
    }

    async fn lease(&self) -> Option<Box<dyn JobLease>> {
        loop {
            let notified = self.notify.notified();
            {
                let mut state = self.state.lock().await;
                if let Some(job) = state.ready.pop_front() {
                    state.in_progress.insert(job.id);
                    let more = !state.ready.is_empty();
                    drop(state);
                    if more {
                        // pass the wakeup on; notify_one permits do not stack
                        self.notify.notify_one();
                    }
                    return Some(Box::new(InMemoryLease {
                        job,
                        queue: Arc::clone(&self.state),
                        finished: Arc::clone(&self.finished),
                    }));
                }
                if state.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    async fn counts(&self) -> QueueCounts {
        self.state.lock().await.counts()
    }

    async fn close(&self) {
        self.state.lock().await.closed = true;
        self.notify.notify_waiters();
    }

    async fn wait_idle(&self) {
        loop {
            let finished = self.finished.notified();
            if self.state.lock().await.is_idle() {
                return;
            }
            finished.await;
        }
    }
}

/// Lease on one job. The worker owns it until `finish`.
struct InMemoryLease {
    job: Job,
    queue: Arc<Mutex<InMemoryQueueState>>,
    finished: Arc<Notify>,
}

#[async_trait]
impl JobLease for InMemoryLease {
    fn job(&self) -> &Job {
        &self.job
    }

    async fn finish(self: Box<Self>, outcome: JobState) {
        debug_assert!(outcome.is_terminal());
        {
            let mut state = self.queue.lock().await;
            if state.in_progress.remove(&self.job.id) {
                match outcome {
                    JobState::Done => state.done += 1,
                    JobState::FailedDelivered => state.failed_delivered += 1,
                    JobState::Queued | JobState::InProgress => {}
                }
            }
        }
        self.finished.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn job(q: &str) -> Job {
        Job::new("s", "t", q)
    }

    #[tokio::test]
    async fn enqueue_reports_depth() {
        let queue = InMemoryQueue::new();

        assert_eq!(queue.enqueue(job("a")).await.unwrap(), 1);
        assert_eq!(queue.enqueue(job("b")).await.unwrap(), 2);
        assert_eq!(queue.enqueue(job("c")).await.unwrap(), 3);

        let counts = queue.counts().await;
        assert_eq!(counts.queued, 3);
        assert_eq!(counts.in_progress, 0);
    }

    #[tokio::test]
    async fn leases_in_fifo_order() {
        let queue = InMemoryQueue::new();
        for q in ["first", "second", "third"] {
            queue.enqueue(job(q)).await.unwrap();
        }

        let mut seen = Vec::new();
        for _ in 0..3 {
            let lease = queue.lease().await.unwrap();
            seen.push(lease.job().question.clone());
            lease.finish(JobState::Done).await;
        }

        assert_eq!(seen, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn lease_moves_job_to_in_progress() {
        let queue = InMemoryQueue::new();
        let j = job("a");
        let id = j.id;
        queue.enqueue(j).await.unwrap();

        let lease = tokio::time::timeout(Duration::from_millis(100), queue.lease())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(queue.state_of(id).await, Some(JobState::InProgress));
        let counts = queue.counts().await;
        assert_eq!(counts.queued, 0);
        assert_eq!(counts.in_progress, 1);

        lease.finish(JobState::FailedDelivered).await;
        assert_eq!(queue.state_of(id).await, None);
        let counts = queue.counts().await;
        assert_eq!(counts.failed_delivered, 1);
        assert_eq!(counts.in_progress, 0);
    }

    #[tokio::test]
    async fn finished_jobs_are_forgotten_but_counted() {
        let queue = InMemoryQueue::new();
        let mut first = None;
        for i in 0..10_000 {
            let j = job(&format!("q{i}"));
            first.get_or_insert(j.id);
            queue.enqueue(j).await.unwrap();
            let lease = queue.lease().await.unwrap();
            lease.finish(JobState::Done).await;
        }

        assert_eq!(queue.state_of(first.unwrap()).await, None);
        {
            let state = queue.state.lock().await;
            assert!(state.ready.is_empty());
            assert!(state.in_progress.is_empty());
        }
        let counts = queue.counts().await;
        assert_eq!(counts.done, 10_000);
        assert_eq!(counts.finished(), 10_000);
    }

    #[tokio::test]
    async fn lease_waits_for_enqueue() {
        let queue = Arc::new(InMemoryQueue::new());

        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.lease().await.map(|l| l.job().question.clone()) })
        };
        tokio::task::yield_now().await;
        queue.enqueue(job("late")).await.unwrap();

        let got = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.as_deref(), Some("late"));
    }

    #[tokio::test]
    async fn closed_queue_drains_then_returns_none() {
        let queue = InMemoryQueue::new();
        queue.enqueue(job("a")).await.unwrap();
        queue.close().await;

        assert!(matches!(queue.enqueue(job("b")).await, Err(SavolError::Closed)));
        let lease = queue.lease().await.unwrap();
        lease.finish(JobState::Done).await;
        assert!(queue.lease().await.is_none());
    }

    #[tokio::test]
    async fn wait_idle_returns_after_last_finish() {
        let queue = Arc::new(InMemoryQueue::new());
        queue.enqueue(job("a")).await.unwrap();
        let lease = queue.lease().await.unwrap();

        let idle = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.wait_idle().await })
        };
        tokio::task::yield_now().await;
        assert!(!idle.is_finished());

        lease.finish(JobState::Done).await;
        tokio::time::timeout(Duration::from_secs(1), idle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(queue.counts().await.done, 1);
    }
}
