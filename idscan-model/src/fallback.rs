use std::fmt;

/// Why a session moved from one strategy to the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SwitchReason {
    Timeout,
    Quality,
    MaxAttempts,
    Manual,
}

impl SwitchReason {
    /// Switch reason for an approved fallback decision.
    ///
    /// Returns `None` for reasons that only ever refuse a fallback.
    pub fn from_fallback(reason: FallbackReason) -> Option<Self> {
        match reason {
            FallbackReason::Timeout => Some(SwitchReason::Timeout),
            FallbackReason::MaxAttempts => Some(SwitchReason::MaxAttempts),
            FallbackReason::Quality => Some(SwitchReason::Quality),
            FallbackReason::ModeRestriction
            | FallbackReason::InsufficientTime
            | FallbackReason::ErrorType => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SwitchReason::Timeout => "timeout",
            SwitchReason::Quality => "quality",
            SwitchReason::MaxAttempts => "max_attempts",
            SwitchReason::Manual => "manual",
        }
    }
}

impl fmt::Display for SwitchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reason attached to every fallback decision, approved or refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum FallbackReason {
    Timeout,
    MaxAttempts,
    Quality,
    ModeRestriction,
    InsufficientTime,
    ErrorType,
}

impl FallbackReason {
    pub fn as_str(self) -> &'static str {
        match self {
            FallbackReason::Timeout => "timeout",
            FallbackReason::MaxAttempts => "max_attempts",
            FallbackReason::Quality => "quality",
            FallbackReason::ModeRestriction => "mode_restriction",
            FallbackReason::InsufficientTime => "insufficient_time",
            FallbackReason::ErrorType => "error_type",
        }
    }
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of evaluating the fallback policy. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FallbackDecision {
    pub should_fallback: bool,
    pub reason: FallbackReason,
    pub remaining_time_ms: u64,
}

impl FallbackDecision {
    pub fn approve(reason: FallbackReason, remaining_time_ms: u64) -> Self {
        Self {
            should_fallback: true,
            reason,
            remaining_time_ms,
        }
    }

    pub fn refuse(reason: FallbackReason, remaining_time_ms: u64) -> Self {
        Self {
            should_fallback: false,
            reason,
            remaining_time_ms,
        }
    }
}
