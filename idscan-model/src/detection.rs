use std::fmt;

/// Error classes a detector can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DetectorErrorKind {
    /// Camera or vision access denied. Fatal, never retried.
    Permission,
    /// The detector itself gave up on the frame.
    Timeout,
    /// Frame too poor to analyse. Absorbed; the next frame is tried.
    Quality,
    /// Recoverable hiccup, retried within the attempt budget.
    Transient,
    /// Unexpected subsystem failure. Fatal.
    System,
}

impl DetectorErrorKind {
    pub fn is_fatal(self) -> bool {
        matches!(self, DetectorErrorKind::Permission | DetectorErrorKind::System)
    }

    pub fn is_retryable(self) -> bool {
        matches!(self, DetectorErrorKind::Transient | DetectorErrorKind::Timeout)
    }
}

/// Error reported by a detector for a single frame.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DetectorError {
    pub kind: DetectorErrorKind,
    #[cfg_attr(feature = "serde", serde(default))]
    pub message: String,
}

impl DetectorError {
    pub fn new(kind: DetectorErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(DetectorErrorKind::Transient, message)
    }
}

impl fmt::Display for DetectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for DetectorError {}

/// Structured outcome of a detector call on one frame.
///
/// A detector that found nothing in a frame returns no result at all rather
/// than an unsuccessful one.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DetectorResult {
    pub success: bool,
    #[cfg_attr(feature = "serde", serde(default))]
    pub data: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub error: Option<DetectorError>,
}

impl DetectorResult {
    pub fn success(data: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data.into()),
            error: None,
        }
    }

    pub fn failure(error: DetectorError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
        }
    }

    /// Error class of an unsuccessful result. Failures without an attached
    /// error are treated as transient.
    pub fn error_kind(&self) -> Option<DetectorErrorKind> {
        if self.success {
            return None;
        }
        Some(
            self.error
                .as_ref()
                .map(|err| err.kind)
                .unwrap_or(DetectorErrorKind::Transient),
        )
    }

    pub fn is_retryable_failure(&self) -> bool {
        self.error_kind().is_some_and(DetectorErrorKind::is_retryable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_without_error_counts_as_transient() {
        let result = DetectorResult {
            success: false,
            data: None,
            error: None,
        };
        assert_eq!(result.error_kind(), Some(DetectorErrorKind::Transient));
        assert!(result.is_retryable_failure());
    }

    #[test]
    fn success_has_no_error_kind() {
        let result = DetectorResult::success("ANSI 636014");
        assert_eq!(result.error_kind(), None);
        assert!(!result.is_retryable_failure());
    }

    #[test]
    fn permission_and_system_are_fatal() {
        assert!(DetectorErrorKind::Permission.is_fatal());
        assert!(DetectorErrorKind::System.is_fatal());
        assert!(!DetectorErrorKind::Quality.is_fatal());
        assert!(!DetectorErrorKind::Quality.is_retryable());
    }
}
