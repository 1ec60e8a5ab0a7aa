//! App layer: wires ports, clients, composer, queue and workers into a
//! running [`Pipeline`].
//!
//! # Components
//! - **PipelineBuilder**: wiring and fail-fast validation
//! - **Pipeline**: submit / stats / wait_idle / shutdown

pub mod builder;
pub mod pipeline;

pub use self::builder::{BuildError, PipelineBuilder};
pub use self::pipeline::{Acknowledgement, Pipeline, SubmitReceipt};
