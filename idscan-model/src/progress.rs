use chrono::{DateTime, Utc};

use crate::{ScanMode, ScanState, SessionId, StrategyKind};

/// Snapshot of a session for progress reporting.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScanProgress {
    pub session_id: Option<SessionId>,
    pub state: ScanState,
    pub mode: Option<ScanMode>,
    pub start_time: Option<DateTime<Utc>>,
    pub barcode_attempts: u32,
    pub time_elapsed_ms: u64,
    pub message: String,
}

impl ScanProgress {
    /// Progress reported before any session has been started.
    pub fn idle() -> Self {
        Self {
            session_id: None,
            state: ScanState::Idle,
            mode: None,
            start_time: None,
            barcode_attempts: 0,
            time_elapsed_ms: 0,
            message: ScanState::Idle.message().to_string(),
        }
    }
}

/// Why a session ended in `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum FailureReason {
    PermissionDenied,
    TimedOut,
    AttemptsExhausted,
    InsufficientTime,
    SystemError,
    Cancelled,
}

impl FailureReason {
    /// Message safe to show to the user. Raw detector and timer errors never
    /// leave the engine.
    pub fn user_message(self) -> &'static str {
        match self {
            FailureReason::PermissionDenied => "Camera access is required to scan your document.",
            FailureReason::TimedOut | FailureReason::InsufficientTime => {
                "We couldn't read your document in time. Please try again."
            }
            FailureReason::AttemptsExhausted => {
                "We couldn't read the barcode. Please try again."
            }
            FailureReason::SystemError => "Something went wrong. Please try again.",
            FailureReason::Cancelled => "Scan cancelled.",
        }
    }
}

/// Terminal result of a session, reported exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "outcome", rename_all = "snake_case"))]
pub enum SessionOutcome {
    Completed {
        strategy: Option<StrategyKind>,
        data: Option<String>,
    },
    Failed {
        reason: FailureReason,
        message: String,
    },
}

impl SessionOutcome {
    pub fn completed(strategy: Option<StrategyKind>, data: Option<String>) -> Self {
        SessionOutcome::Completed { strategy, data }
    }

    pub fn failed(reason: FailureReason) -> Self {
        SessionOutcome::Failed {
            reason,
            message: reason.user_message().to_string(),
        }
    }

    /// Terminal state this outcome drives the session into.
    pub fn state(&self) -> ScanState {
        match self {
            SessionOutcome::Completed { .. } => ScanState::Completed,
            SessionOutcome::Failed { .. } => ScanState::Failed,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SessionOutcome::Completed { .. })
    }
}

#[cfg(all(test, feature = "serde"))]
mod tests {
    use super::*;

    #[test]
    fn outcome_serializes_with_tag() {
        let json = serde_json::to_value(SessionOutcome::failed(FailureReason::TimedOut))
            .expect("serialize outcome");
        assert_eq!(json["outcome"], "failed");
        assert_eq!(json["reason"], "timed_out");
    }
}
