use async_trait::async_trait;
use idscan_model::{DetectorResult, StrategyKind};

/// Seam to the external vision subsystem.
///
/// `None` means nothing was detected in this frame; the orchestrator does not
/// retry such frames and simply waits for the next one.
#[async_trait]
pub trait FrameDetector: Send + Sync + 'static {
    type Frame: Send + Sync + 'static;

    async fn detect(&self, strategy: StrategyKind, frame: &Self::Frame) -> Option<DetectorResult>;
}
