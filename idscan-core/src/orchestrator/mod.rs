//! Actor shell around the scan engine.
//!
//! [`ScanOrchestrator`] wires a [`StateTransitionManager`], a
//! [`ScanTimeoutManager`] and a [`QualityMetricsProcessor`] to a
//! [`FrameDetector`] and runs them on one task. Hosts talk to it through a
//! [`ScanHandle`].
//!
//! [`StateTransitionManager`]: crate::state::StateTransitionManager
//! [`ScanTimeoutManager`]: crate::timeout::ScanTimeoutManager
//! [`QualityMetricsProcessor`]: crate::quality::QualityMetricsProcessor

mod actor;
mod detector;
mod handle;
mod replay;

use std::fmt;
use std::sync::Arc;

use idscan_model::QualitySample;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::clock::{Clock, tokio_clock};
use crate::config::OrchestratorConfig;
use crate::error::Result;
use crate::events::EventDispatcher;

pub use detector::FrameDetector;
pub use handle::ScanHandle;
pub use replay::{RecordedFrame, ReplayDetector};

/// One camera frame plus the quality sample the external analyzer attached
/// to it, if this frame was sampled.
#[derive(Debug, Clone)]
pub struct FrameInput<F> {
    pub frame: F,
    pub quality: Option<QualitySample>,
}

impl<F> FrameInput<F> {
    pub fn new(frame: F) -> Self {
        Self {
            frame,
            quality: None,
        }
    }

    pub fn with_quality(mut self, sample: QualitySample) -> Self {
        self.quality = Some(sample);
        self
    }
}

pub struct ScanOrchestratorBuilder {
    config: OrchestratorConfig,
    clock: Option<Arc<dyn Clock>>,
    events: Option<EventDispatcher>,
}

impl fmt::Debug for ScanOrchestratorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanOrchestratorBuilder")
            .field("config", &self.config)
            .field("custom_clock", &self.clock.is_some())
            .field("events", &self.events)
            .finish()
    }
}

impl ScanOrchestratorBuilder {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self {
            config,
            clock: None,
            events: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_events(mut self, events: EventDispatcher) -> Self {
        self.events = Some(events);
        self
    }

    pub fn build<D: FrameDetector>(self, detector: D) -> Result<ScanOrchestrator<D>> {
        self.config.validate()?;
        Ok(ScanOrchestrator {
            config: self.config,
            clock: self.clock.unwrap_or_else(tokio_clock),
            events: self.events.unwrap_or_default(),
            detector: Arc::new(detector),
        })
    }
}

/// A configured, not yet running orchestrator.
pub struct ScanOrchestrator<D: FrameDetector> {
    config: OrchestratorConfig,
    clock: Arc<dyn Clock>,
    events: EventDispatcher,
    detector: Arc<D>,
}

impl<D: FrameDetector> fmt::Debug for ScanOrchestrator<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanOrchestrator")
            .field("config", &self.config)
            .field("clock", &self.clock)
            .field("events", &self.events)
            .field("detector_type", &std::any::type_name::<D>())
            .finish()
    }
}

impl<D: FrameDetector> ScanOrchestrator<D> {
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }

    /// Spawns the actor on the current tokio runtime.
    pub fn spawn(self) -> ScanHandle<D::Frame> {
        let (commands_tx, commands_rx) = mpsc::channel(self.config.mailbox_capacity);
        let (signals_tx, signals_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        let actor = actor::Actor::new(
            self.config,
            self.clock,
            self.events.clone(),
            self.detector,
            signals_tx,
        );
        let task = tokio::spawn(actor.run(commands_rx, signals_rx, shutdown.clone()));

        ScanHandle::new(commands_tx, self.events, shutdown, task)
    }
}
