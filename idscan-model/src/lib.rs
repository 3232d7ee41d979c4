//! Core data model definitions shared across idscan crates.
#![allow(missing_docs)]

pub mod detection;
pub mod fallback;
pub mod ids;
pub mod progress;
pub mod quality;
pub mod scan;

// Intentionally curated re-exports for downstream consumers.
pub use detection::{DetectorError, DetectorErrorKind, DetectorResult};
pub use fallback::{FallbackDecision, FallbackReason, SwitchReason};
pub use ids::SessionId;
pub use progress::{FailureReason, ScanProgress, SessionOutcome};
pub use quality::{QualityAssessment, QualitySample};
pub use scan::{ScanMode, ScanState, StrategyKind};
