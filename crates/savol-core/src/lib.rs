//! savol-core
//!
//! Asynchronous answer pipeline: questions go into a FIFO queue, a fixed pool
//! of workers composes answers with a rate-limited language-model client, an
//! advisory web-search client and a TTL answer cache, and results are pushed
//! to a delivery sink.
//!
//! # Modules
//! - **domain**: jobs, ids, language, upstream errors, pipeline events
//! - **ports**: traits for every outside collaborator (model, search, chat transport, history, events, clock)
//! - **client**: completion client (semaphore + retry) and search client (depth, allowlist)
//! - **composer**: cache -> draft -> verify -> cache write, per job
//! - **queue** / **worker**: job queue, service-time estimate, worker pool
//! - **app**: `PipelineBuilder` and the running `Pipeline`
//! - **impls**: HTTP backends (OpenAI-compatible, Tavily), echo backend, in-memory history
//! - **config**: TOML + environment configuration

pub mod app;
pub mod cache;
pub mod client;
pub mod composer;
pub mod config;
pub mod domain;
pub mod error;
pub mod freshness;
pub mod impls;
pub mod messages;
pub mod observability;
pub mod ports;
pub mod queue;
pub mod retry;
pub mod worker;

#[cfg(test)]
mod testing;

pub use app::{Acknowledgement, BuildError, Pipeline, PipelineBuilder, SubmitReceipt};
pub use config::PipelineConfig;
pub use domain::{Job, Lang};
pub use error::SavolError;
