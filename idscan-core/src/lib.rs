//! Scan-mode orchestration engine for identity-document scanning.
//!
//! Three components cooperate on one logical thread:
//!
//! - [`QualityMetricsProcessor`] turns per-frame quality samples into a
//!   rolling readiness signal and may propose an early strategy switch.
//! - [`ScanTimeoutManager`] owns every timer of a session and the bounded
//!   retry loop used for detector calls.
//! - [`StateTransitionManager`] is the sole owner of the session record. It
//!   runs the pure state machine in [`state::machine`], enforces the fallback
//!   policy and emits events through an [`EventDispatcher`].
//!
//! [`ScanOrchestrator`] is the async shell that ties them to a
//! [`FrameDetector`].
#![allow(missing_docs)]

pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod quality;
pub mod state;
pub mod timeout;

pub use clock::{Clock, ManualClock, TokioClock, tokio_clock};
pub use config::{FallbackConfig, OrchestratorConfig, QualityConfig, QualityWeights, RetryConfig};
pub use error::{Result, ScanError};
pub use events::{BroadcastObserver, EventDispatcher, ScanEvent, ScanObserver};
pub use orchestrator::{
    FrameDetector, FrameInput, RecordedFrame, ReplayDetector, ScanHandle, ScanOrchestrator,
    ScanOrchestratorBuilder,
};
pub use quality::{QualityMetricsProcessor, QualityVerdict};
pub use state::{StateTransitionManager, TimerDirective};
pub use timeout::{RetryRunner, ScanTimeoutManager, TimeoutFired, TimeoutHandle, TimerKey};

pub use idscan_model as model;
