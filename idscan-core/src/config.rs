use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScanError};

/// Global knobs that tune orchestrator behaviour.
///
/// All fields carry defaults so callers can supply partial configuration
/// documents and progressively adopt new tuning options.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Per-session fallback policy.
    pub fallback: FallbackConfig,
    /// Frame-quality aggregation.
    pub quality: QualityConfig,
    /// Detector retry/backoff policy.
    pub retry: RetryConfig,
    /// Delay spent in `fallback_transition` so the UI can animate the switch.
    pub transition_grace_ms: u64,
    /// Capacity of the host command mailbox.
    pub mailbox_capacity: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            fallback: FallbackConfig::default(),
            quality: QualityConfig::default(),
            retry: RetryConfig::default(),
            transition_grace_ms: 300,
            mailbox_capacity: 256,
        }
    }
}

impl OrchestratorConfig {
    pub fn transition_grace(&self) -> Duration {
        Duration::from_millis(self.transition_grace_ms)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.fallback.validate()?;
        self.quality.validate()?;
        self.retry.validate()?;
        if self.mailbox_capacity == 0 {
            return Err(ScanError::InvalidConfig(
                "mailbox_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Caller-supplied fallback policy for a session.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    /// Budget before the barcode strategy is declared timed out.
    pub barcode_timeout_ms: u64,
    /// Budget before the OCR strategy is declared timed out.
    pub ocr_timeout_ms: u64,
    /// Failed barcode attempts tolerated before a forced fallback.
    pub max_barcode_attempts: u32,
    /// Total session budget. Fallback is refused once too little remains.
    pub max_fallback_processing_time_ms: u64,
    /// Master switch for automatic mode switching.
    pub enable_auto_fallback: bool,
    /// Overall quality floor below which a quality-triggered switch is proposed.
    pub min_quality_threshold: f32,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            barcode_timeout_ms: 10_000,
            ocr_timeout_ms: 15_000,
            max_barcode_attempts: 5,
            max_fallback_processing_time_ms: 30_000,
            enable_auto_fallback: true,
            min_quality_threshold: 0.5,
        }
    }
}

impl FallbackConfig {
    pub fn barcode_timeout(&self) -> Duration {
        Duration::from_millis(self.barcode_timeout_ms)
    }

    pub fn ocr_timeout(&self) -> Duration {
        Duration::from_millis(self.ocr_timeout_ms)
    }

    pub fn max_processing_time(&self) -> Duration {
        Duration::from_millis(self.max_fallback_processing_time_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.barcode_timeout_ms == 0 || self.ocr_timeout_ms == 0 {
            return Err(ScanError::InvalidConfig(
                "strategy timeouts must be greater than zero".into(),
            ));
        }
        if self.max_fallback_processing_time_ms == 0 {
            return Err(ScanError::InvalidConfig(
                "max_fallback_processing_time_ms must be greater than zero".into(),
            ));
        }
        if self.max_barcode_attempts == 0 {
            return Err(ScanError::InvalidConfig(
                "max_barcode_attempts must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_quality_threshold) {
            return Err(ScanError::InvalidConfig(format!(
                "min_quality_threshold must be within [0, 1], got {}",
                self.min_quality_threshold
            )));
        }
        Ok(())
    }
}

/// Relative weight of each sub-score in the overall quality score.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityWeights {
    pub blur: f32,
    pub lighting: f32,
    pub positioning: f32,
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            blur: 0.4,
            lighting: 0.3,
            positioning: 0.3,
        }
    }
}

impl QualityWeights {
    pub fn total(&self) -> f32 {
        self.blur + self.lighting + self.positioning
    }
}

/// Tuning for the rolling frame-quality assessment.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    pub weights: QualityWeights,
    /// Rolling buffer capacity; oldest entries are evicted first.
    pub buffer_capacity: usize,
    /// Minimum spacing between trend evaluations. Frames in between are
    /// scored and buffered but not re-evaluated.
    pub sample_interval_ms: u64,
    /// Buffered frames required before a switch can be proposed.
    pub min_samples: usize,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            weights: QualityWeights::default(),
            buffer_capacity: 10,
            sample_interval_ms: 200,
            min_samples: 5,
        }
    }
}

impl QualityConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        let weights = [
            self.weights.blur,
            self.weights.lighting,
            self.weights.positioning,
        ];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ScanError::InvalidConfig(
                "quality weights must be finite and non-negative".into(),
            ));
        }
        if self.weights.total() <= 0.0 {
            return Err(ScanError::InvalidConfig(
                "at least one quality weight must be positive".into(),
            ));
        }
        if self.buffer_capacity == 0 {
            return Err(ScanError::InvalidConfig(
                "quality buffer_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Retry policy for detector calls.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Calls per frame before a transient detector failure is reported.
    pub detector_attempts: u32,
    /// Fixed delay between attempts.
    pub backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            detector_attempts: 2,
            backoff_ms: 100,
        }
    }
}

impl RetryConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.detector_attempts == 0 {
            return Err(ScanError::InvalidConfig(
                "retry.detector_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
