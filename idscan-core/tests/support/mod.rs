#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use idscan_core::model::{
    DetectorError, DetectorErrorKind, DetectorResult, ScanProgress, ScanState, SessionOutcome,
    StrategyKind, SwitchReason,
};
use idscan_core::{
    EventDispatcher, FrameInput, OrchestratorConfig, RecordedFrame, ReplayDetector, ScanEvent,
    ScanHandle, ScanOrchestratorBuilder,
};
use parking_lot::Mutex;

/// Collects every event dispatched to it, in order.
#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<ScanEvent>>>,
}

impl Recorder {
    pub fn attach(dispatcher: &EventDispatcher) -> Self {
        let recorder = Self::default();
        let sink = Arc::clone(&recorder.events);
        dispatcher.subscribe(move |event: &ScanEvent| sink.lock().push(event.clone()));
        recorder
    }

    pub fn events(&self) -> Vec<ScanEvent> {
        self.events.lock().clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(ScanEvent::name).collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.names().into_iter().filter(|n| *n == name).count()
    }

    pub fn transitions(&self) -> Vec<(ScanState, ScanState)> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                ScanEvent::StateChanged { from, to, .. } => Some((*from, *to)),
                _ => None,
            })
            .collect()
    }

    pub fn switches(&self) -> Vec<(StrategyKind, StrategyKind, SwitchReason)> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                ScanEvent::ModeSwitched { from, to, reason, .. } => Some((*from, *to, *reason)),
                _ => None,
            })
            .collect()
    }

    pub fn outcomes(&self) -> Vec<SessionOutcome> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                ScanEvent::SessionFinished { outcome, .. } => Some(outcome.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

/// Short budgets, single detector attempt and every quality frame sampled.
pub fn test_config() -> OrchestratorConfig {
    let mut config = OrchestratorConfig::default();
    config.fallback.barcode_timeout_ms = 3_000;
    config.fallback.ocr_timeout_ms = 5_000;
    config.fallback.max_barcode_attempts = 3;
    config.fallback.max_fallback_processing_time_ms = 30_000;
    config.retry.detector_attempts = 1;
    config.retry.backoff_ms = 50;
    config.transition_grace_ms = 300;
    config.quality.sample_interval_ms = 0;
    config.quality.min_samples = 3;
    config
}

pub struct Harness {
    pub handle: ScanHandle<RecordedFrame>,
    pub recorder: Recorder,
    pub detector: ReplayDetector,
}

pub fn spawn(config: OrchestratorConfig) -> Harness {
    let detector = ReplayDetector::new();
    let orchestrator = ScanOrchestratorBuilder::new(config)
        .build(detector.clone())
        .expect("test config is valid");
    let recorder = Recorder::attach(orchestrator.events());
    Harness {
        handle: orchestrator.spawn(),
        recorder,
        detector,
    }
}

impl Harness {
    /// Lets spawned detector and timer tasks run, then round-trips the
    /// mailbox so every queued command and signal has been handled.
    pub async fn settle(&self) -> ScanProgress {
        tokio::time::sleep(Duration::from_millis(1)).await;
        self.handle.progress().await.expect("orchestrator running")
    }

    pub async fn advance(&self, millis: u64) -> ScanProgress {
        tokio::time::sleep(Duration::from_millis(millis)).await;
        self.settle().await
    }

    pub async fn frame(&self, frame: RecordedFrame) -> ScanProgress {
        self.handle
            .submit_frame(FrameInput::new(frame))
            .await
            .expect("orchestrator running");
        self.settle().await
    }
}

pub fn barcode_error(kind: DetectorErrorKind) -> RecordedFrame {
    RecordedFrame::barcode(DetectorResult::failure(DetectorError::new(kind, "recorded")))
}

pub fn ocr_error(kind: DetectorErrorKind) -> RecordedFrame {
    RecordedFrame::ocr(DetectorResult::failure(DetectorError::new(kind, "recorded")))
}
