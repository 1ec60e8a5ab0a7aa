//! Job state machine.

use serde::{Deserialize, Serialize};

/// Job state.
///
/// Transitions:
/// - Queued -> InProgress -> Done
/// - Queued -> InProgress -> FailedDelivered
///
/// There is no cancelled state: once queued, a job reaches one of the two
/// terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting for a worker.
    Queued,

    /// Leased by a worker.
    InProgress,

    /// A real answer was delivered.
    Done,

    /// A friendly error was delivered instead of an answer.
    FailedDelivered,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Done | JobState::FailedDelivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_delivered_states_are_terminal() {
        assert!(!JobState::Queued.is_terminal());
        assert!(!JobState::InProgress.is_terminal());
        assert!(JobState::Done.is_terminal());
        assert!(JobState::FailedDelivered.is_terminal());
    }

    #[test]
    fn serializes_snake_case() {
        let json = serde_json::to_string(&JobState::FailedDelivered).unwrap();
        assert_eq!(json, "\"failed_delivered\"");
    }
}
