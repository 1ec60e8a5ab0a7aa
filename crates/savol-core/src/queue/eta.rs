//! Service-time estimate and queue-wait ETA.

use std::sync::Mutex;
use std::time::Duration;

/// Exponential moving average of job service time.
///
/// Unset until the first observation, which seeds it. Shared by all workers;
/// each update is one short critical section.
#[derive(Debug)]
pub struct ServiceTimeEstimate {
    alpha: f64,
    average_secs: Mutex<Option<f64>>,
}

impl ServiceTimeEstimate {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha: alpha.clamp(f64::MIN_POSITIVE, 1.0),
            average_secs: Mutex::new(None),
        }
    }

    /// Blend one finished job into the average.
    pub fn observe(&self, elapsed: Duration) {
        let sample = elapsed.as_secs_f64();
        let mut avg = self
            .average_secs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *avg = Some(match *avg {
            None => sample,
            Some(prev) => self.alpha * sample + (1.0 - self.alpha) * prev,
        });
    }

    pub fn average(&self) -> Option<Duration> {
        let avg = self
            .average_secs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        avg.and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }
}

impl Default for ServiceTimeEstimate {
    fn default() -> Self {
        Self::new(0.3)
    }
}

/// Expected wait for a job at `position` (1 = next to run).
///
/// `clamp(avg * (position - 1) / workers, min, max)`
pub fn eta(position: usize, workers: usize, avg: Duration, min: Duration, max: Duration) -> Duration {
    let ahead = position.saturating_sub(1) as f64;
    let workers = workers.max(1) as f64;
    let raw = Duration::try_from_secs_f64(avg.as_secs_f64() * ahead / workers).unwrap_or(Duration::MAX);
    raw.clamp(min, max.max(min))
}
