//! Retry policy and the retry loop shared by every outbound call.
//!
//! This is the only place in the crate that retries. The completion client
//! and the search client each wrap their backend call in [`retry`] with their
//! own [`RetryPolicy`]; nothing above them retries again.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::UpstreamError;

/// Errors that know whether another attempt may succeed.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for UpstreamError {
    fn is_retryable(&self) -> bool {
        self.is_transient()
    }
}

/// Exponential backoff with jitter, bounded by a maximum attempt count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,

    /// Delay before the second attempt.
    #[serde(with = "millis", rename = "base_delay_ms")]
    pub base_delay: Duration,

    /// Upper bound of the uniform random jitter added to every delay.
    #[serde(with = "millis", rename = "max_jitter_ms", default = "default_jitter")]
    pub max_jitter: Duration,
}

fn default_jitter() -> Duration {
    Duration::from_millis(200)
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_jitter: default_jitter(),
        }
    }

    /// Completion calls: 3 attempts.
    pub fn completion() -> Self {
        Self::new(3, Duration::from_millis(800))
    }

    /// Search is advisory, so a long wait buys nothing: 2 attempts.
    pub fn search() -> Self {
        Self::new(2, Duration::from_millis(800))
    }

    pub fn without_jitter(mut self) -> Self {
        self.max_jitter = Duration::ZERO;
        self
    }

    /// Backoff before the next attempt, without jitter.
    ///
    /// `attempt` is the 0-indexed attempt that just failed:
    /// delay = base_delay * 2^attempt, saturating at `Duration::MAX`
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(1 << attempt.min(16))
    }

    /// Backoff plus `uniform(0, max_jitter)`.
    pub fn delay_with_jitter<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let jitter = if self.max_jitter.is_zero() {
            Duration::ZERO
        } else {
            let secs = rng.gen_range(0.0..self.max_jitter.as_secs_f64());
            Duration::try_from_secs_f64(secs).unwrap_or(self.max_jitter)
        };
        self.backoff(attempt).saturating_add(jitter)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::completion()
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// `policy.max_attempts` attempts have been made.
///
/// `operation` is called once per attempt and must produce a brand new call
/// each time. Non-retryable errors are returned immediately without using up
/// an attempt's backoff; after the last retryable failure that error is
/// returned as is.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<T, E>
where
    E: Retryable + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt: u32 = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_retryable() => {
                debug!(attempt, error = %err, "non-retryable failure");
                return Err(err);
            }
            Err(err) => {
                if attempt + 1 >= max_attempts {
                    warn!(attempts = attempt + 1, error = %err, "retries exhausted");
                    return Err(err);
                }
                let delay = policy.delay_with_jitter(attempt, &mut rand::thread_rng());
                debug!(attempt, ?delay, error = %err, "retryable failure, backing off");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
