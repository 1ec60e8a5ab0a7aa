//! Test doubles shared by the unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::domain::{TargetId, UpstreamError};
use crate::ports::{
    CompletionBackend, CompletionRequest, DeliverySink, SearchBackend, SearchHit, SearchQuery,
};

/// Ordered record of outbound calls across several doubles.
#[derive(Debug, Default)]
pub struct CallLog {
    entries: Mutex<Vec<&'static str>>,
}

impl CallLog {
    pub fn push(&self, entry: &'static str) {
        self.entries.lock().unwrap().push(entry);
    }

    pub fn entries(&self) -> Vec<&'static str> {
        self.entries.lock().unwrap().clone()
    }
}

type Responder = dyn Fn(&CompletionRequest) -> Result<String, UpstreamError> + Send + Sync;
type Delay = dyn Fn(&CompletionRequest) -> Duration + Send + Sync;

pub struct ScriptedCompletion {
    responder: Box<Responder>,
    delay: Box<Delay>,
    calls: Mutex<Vec<CompletionRequest>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    log: Option<Arc<CallLog>>,
}

impl ScriptedCompletion {
    pub fn with_fn(
        f: impl Fn(&CompletionRequest) -> Result<String, UpstreamError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Box::new(f),
            delay: Box::new(|_| Duration::ZERO),
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            log: None,
        }
    }

    pub fn replying(text: &str) -> Self {
        let text = text.to_string();
        Self::with_fn(move |_| Ok(text.clone()))
    }

    pub fn failing(err: UpstreamError) -> Self {
        Self::with_fn(move |_| Err(err.clone()))
    }

    /// Replies with the user turn it was sent.
    pub fn echo() -> Self {
        Self::with_fn(|req| Ok(req.user_text().to_string()))
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        self.with_delay_fn(move |_| delay)
    }

    /// Per-request service time, e.g. to make one question hang.
    pub fn with_delay_fn(
        mut self,
        f: impl Fn(&CompletionRequest) -> Duration + Send + Sync + 'static,
    ) -> Self {
        self.delay = Box::new(f);
        self
    }

    pub fn with_log(mut self, log: Arc<CallLog>) -> Self {
        self.log = Some(log);
        self
    }

    pub fn calls(&self) -> Vec<CompletionRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionBackend for ScriptedCompletion {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, UpstreamError> {
        self.calls.lock().unwrap().push(request.clone());
        if let Some(log) = &self.log {
            log.push("completion");
        }
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let delay = (self.delay)(request);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        (self.responder)(request)
    }
}

pub fn hit(title: &str, snippet: &str, url: &str) -> SearchHit {
    SearchHit {
        title: title.to_string(),
        snippet: snippet.to_string(),
        url: url.to_string(),
    }
}

pub struct StubSearch {
    result: Result<Vec<SearchHit>, UpstreamError>,
    calls: Mutex<Vec<SearchQuery>>,
    log: Option<Arc<CallLog>>,
}

impl StubSearch {
    pub fn returning(hits: Vec<SearchHit>) -> Self {
        Self {
            result: Ok(hits),
            calls: Mutex::new(Vec::new()),
            log: None,
        }
    }

    pub fn failing(err: UpstreamError) -> Self {
        Self {
            result: Err(err),
            calls: Mutex::new(Vec::new()),
            log: None,
        }
    }

    pub fn with_log(mut self, log: Arc<CallLog>) -> Self {
        self.log = Some(log);
        self
    }

    pub fn calls(&self) -> Vec<SearchQuery> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchBackend for StubSearch {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchHit>, UpstreamError> {
        self.calls.lock().unwrap().push(query.clone());
        if let Some(log) = &self.log {
            log.push("search");
        }
        self.result.clone()
    }
}

/// Delivery sink that remembers everything and lets tests wait for it.
#[derive(Default)]
pub struct RecordingDelivery {
    delivered: Mutex<Vec<(TargetId, String)>>,
    notify: Notify,
}

impl RecordingDelivery {
    pub fn delivered(&self) -> Vec<(TargetId, String)> {
        self.delivered.lock().unwrap().clone()
    }

    pub async fn wait_for(&self, n: usize) -> Vec<(TargetId, String)> {
        loop {
            let notified = self.notify.notified();
            {
                let delivered = self.delivered.lock().unwrap();
                if delivered.len() >= n {
                    return delivered.clone();
                }
            }
            notified.await;
        }
    }
}

#[async_trait]
impl DeliverySink for RecordingDelivery {
    async fn deliver(&self, target: &TargetId, text: &str) {
        self.delivered
            .lock()
            .unwrap()
            .push((target.clone(), text.to_string()));
        self.notify.notify_waiters();
    }
}
