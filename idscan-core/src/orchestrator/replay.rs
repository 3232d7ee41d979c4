//! Detector that replays pre-recorded per-frame outcomes.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use idscan_model::{DetectorResult, StrategyKind};
use serde::{Deserialize, Serialize};

use super::detector::FrameDetector;

/// What each strategy reports for one recorded frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordedFrame {
    pub barcode: Option<DetectorResult>,
    pub ocr: Option<DetectorResult>,
}

impl RecordedFrame {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn barcode(result: DetectorResult) -> Self {
        Self {
            barcode: Some(result),
            ocr: None,
        }
    }

    pub fn ocr(result: DetectorResult) -> Self {
        Self {
            barcode: None,
            ocr: Some(result),
        }
    }

    pub fn for_strategy(&self, strategy: StrategyKind) -> Option<&DetectorResult> {
        match strategy {
            StrategyKind::Barcode => self.barcode.as_ref(),
            StrategyKind::Ocr => self.ocr.as_ref(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReplayDetector {
    calls: Arc<AtomicUsize>,
}

impl ReplayDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of detector invocations so far, retries included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FrameDetector for ReplayDetector {
    type Frame = RecordedFrame;

    async fn detect(&self, strategy: StrategyKind, frame: &RecordedFrame) -> Option<DetectorResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        frame.for_strategy(strategy).cloned()
    }
}
