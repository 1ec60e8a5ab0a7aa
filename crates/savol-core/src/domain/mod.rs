//! Domain model (ids, jobs, language, errors, events).

pub mod errors;
pub mod events;
pub mod ids;
pub mod job;
pub mod lang;

pub use self::errors::{FailureKind, UpstreamError};
pub use self::events::PipelineEvent;
pub use self::ids::{JobId, SessionId, TargetId};
pub use self::job::Job;
pub use self::lang::Lang;
