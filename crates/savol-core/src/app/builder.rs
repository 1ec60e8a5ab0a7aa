//! PipelineBuilder: wiring and start-up validation.
//!
//! Fail-fast: a missing required port or an unusable config is reported by
//! `build()`, before any worker is spawned.

use std::sync::Arc;

use tracing::info;

use super::pipeline::Pipeline;
use crate::cache::AnswerCache;
use crate::client::{CompletionClient, SearchClient};
use crate::composer::{Composer, ComposerSettings};
use crate::config::{ConfigError, PipelineConfig};
use crate::ports::{
    Clock, CompletionBackend, DeliverySink, EventSink, HistoryProvider, NoHistory,
    NoopEventSink, SearchBackend, SystemClock,
};
use crate::queue::{InMemoryQueue, JobQueue, ServiceTimeEstimate};
use crate::worker::{WorkerContext, WorkerGroup};

/// # Example
/// ```ignore
/// let pipeline = PipelineBuilder::new(config)
///     .completion(Arc::new(openai))
///     .search(Arc::new(tavily))
///     .delivery(Arc::new(sink))
///     .build()?;
/// ```
pub struct PipelineBuilder {
    config: PipelineConfig,
    completion: Option<Arc<dyn CompletionBackend>>,
    search: Option<Arc<dyn SearchBackend>>,
    delivery: Option<Arc<dyn DeliverySink>>,
    history: Arc<dyn HistoryProvider>,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("missing required component: {0}")]
    Missing(&'static str),

    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),
}

impl PipelineBuilder {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            completion: None,
            search: None,
            delivery: None,
            history: Arc::new(NoHistory),
            events: Arc::new(NoopEventSink),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn completion(mut self, backend: Arc<dyn CompletionBackend>) -> Self {
        self.completion = Some(backend);
        self
    }

    /// Without a search backend every job takes the plain path, and
    /// citation-required jobs get the "no authoritative source" text.
    pub fn search(mut self, backend: Arc<dyn SearchBackend>) -> Self {
        self.search = Some(backend);
        self
    }

    pub fn delivery(mut self, sink: Arc<dyn DeliverySink>) -> Self {
        self.delivery = Some(sink);
        self
    }

    pub fn history(mut self, provider: Arc<dyn HistoryProvider>) -> Self {
        self.history = provider;
        self
    }

    pub fn events(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Validate, wire and spawn the workers. Must run inside a tokio runtime.
    pub fn build(self) -> Result<Pipeline, BuildError> {
        self.config.validate()?;
        let completion = self
            .completion
            .ok_or(BuildError::Missing("completion backend"))?;
        let delivery = self.delivery.ok_or(BuildError::Missing("delivery sink"))?;
        let config = self.config;

        let completion = Arc::new(CompletionClient::new(
            completion,
            config.model_concurrency,
            config.completion_retry.clone(),
        ));
        let search = self.search.map(|backend| {
            SearchClient::new(backend, config.search_retry.clone()).with_clock(Arc::clone(&self.clock))
        });
        let search_enabled = search.is_some();
        let cache = Arc::new(AnswerCache::with_clock(
            config.cache_ttl(),
            config.cache_capacity,
            Arc::clone(&self.clock),
        ));
        let composer = Composer::new(
            Arc::clone(&completion),
            search,
            cache,
            ComposerSettings::from_config(&config),
        )
        .with_history(self.history)
        .with_events(Arc::clone(&self.events))
        .with_clock(self.clock);

        let estimate = Arc::new(ServiceTimeEstimate::new(config.ema_alpha));
        let ctx = Arc::new(WorkerContext {
            composer: Arc::new(composer),
            delivery,
            events: Arc::clone(&self.events),
            estimate: Arc::clone(&estimate),
            job_timeout: config.job_timeout(),
        });

        let queue: Arc<dyn JobQueue> = Arc::new(InMemoryQueue::new());
        let workers = WorkerGroup::spawn(config.worker_count, Arc::clone(&queue), Arc::clone(&ctx));
        info!(
            workers = config.worker_count,
            model_concurrency = config.model_concurrency,
            search = search_enabled,
            "pipeline started"
        );

        Ok(Pipeline::new(queue, workers, ctx, completion, self.events, config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingDelivery, ScriptedCompletion};

    #[tokio::test]
    async fn build_requires_completion_backend() {
        let result = PipelineBuilder::new(PipelineConfig::default())
            .delivery(Arc::new(RecordingDelivery::default()))
            .build();
        assert!(matches!(result, Err(BuildError::Missing("completion backend"))));
    }

    #[tokio::test]
    async fn build_requires_delivery_sink() {
        let result = PipelineBuilder::new(PipelineConfig::default())
            .completion(Arc::new(ScriptedCompletion::replying("ok")))
            .build();
        assert!(matches!(result, Err(BuildError::Missing("delivery sink"))));
    }

    #[tokio::test]
    async fn build_rejects_invalid_config() {
        let mut config = PipelineConfig::default();
        config.model_concurrency = 0;
        let result = PipelineBuilder::new(config)
            .completion(Arc::new(ScriptedCompletion::replying("ok")))
            .delivery(Arc::new(RecordingDelivery::default()))
            .build();
        assert!(matches!(result, Err(BuildError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn build_spawns_configured_workers() {
        let mut config = PipelineConfig::default();
        config.worker_count = 3;
        let pipeline = PipelineBuilder::new(config)
            .completion(Arc::new(ScriptedCompletion::replying("ok")))
            .delivery(Arc::new(RecordingDelivery::default()))
            .build()
            .unwrap();

        assert_eq!(pipeline.worker_count(), 3);
        pipeline.shutdown().await;
    }
}
