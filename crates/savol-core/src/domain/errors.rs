//! Errors and their operational classification.
//!
//! `UpstreamError` is the only error produced by outbound calls (completion
//! and search). It never travels further than the two clients: they convert
//! it into a plain value (`FailureKind` + localized text, or "no results").

use thiserror::Error;

/// Failure of a single outbound HTTP call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamError {
    #[error("upstream returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("upstream call timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed upstream response: {0}")]
    Malformed(String),
}

impl UpstreamError {
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self::Status {
            status,
            body: body.into(),
        }
    }

    /// Rate limiting, server errors and I/O timeouts are worth another try;
    /// everything else (client errors, bad requests, bad payloads) is not.
    pub fn is_transient(&self) -> bool {
        match self {
            UpstreamError::Status { status, .. } => matches!(status, 429 | 500 | 502 | 503 | 504),
            UpstreamError::Timeout | UpstreamError::Transport(_) => true,
            UpstreamError::Malformed(_) => false,
        }
    }

    /// Which friendly message the user should see for this failure.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            UpstreamError::Status { status: 429, .. } => FailureKind::RateLimited,
            UpstreamError::Status { status: 401 | 403, .. } => FailureKind::Auth,
            UpstreamError::Status { status: 402, .. } => FailureKind::Billing,
            UpstreamError::Status { status, .. } if (500..=599).contains(status) => {
                FailureKind::Unavailable
            }
            UpstreamError::Timeout | UpstreamError::Transport(_) => FailureKind::Timeout,
            _ => FailureKind::Generic,
        }
    }
}

/// User-facing failure classes.
///
/// - `Timeout`, `RateLimited`, `Unavailable`: transient, "try again later"
/// - `Auth`, `Billing`: terminal, "contact support"
/// - `Generic`: anything else
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    Timeout,
    RateLimited,
    Auth,
    Billing,
    Unavailable,
    Generic,
}

impl FailureKind {
    pub fn is_terminal(self) -> bool {
        matches!(self, FailureKind::Auth | FailureKind::Billing)
    }
}
