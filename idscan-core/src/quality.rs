//! Rolling frame-quality aggregation.
//!
//! Every sample is scored and buffered, which is cheap. The trend check that
//! may propose a strategy switch only runs once per `sample_interval`, so a
//! fast camera never pays for it on every frame.

use std::collections::VecDeque;
use std::sync::Arc;

use idscan_model::{QualityAssessment, QualitySample};
use tokio::time::Instant;

use crate::clock::Clock;
use crate::config::{QualityConfig, QualityWeights};
use crate::events::{EventDispatcher, ScanEvent};

/// Result of feeding one sample through the processor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityVerdict {
    pub assessment: QualityAssessment,
    /// The rolling trend is below the quality floor and a switch is proposed.
    pub should_switch: bool,
    /// Whether this frame triggered a trend evaluation (and an event).
    pub sampled: bool,
}

/// Converts raw per-frame samples into a smoothed readiness signal.
#[derive(Debug)]
pub struct QualityMetricsProcessor {
    config: QualityConfig,
    threshold: f32,
    buffer: VecDeque<QualityAssessment>,
    last_assessment: Option<Instant>,
    clock: Arc<dyn Clock>,
    events: EventDispatcher,
}

impl QualityMetricsProcessor {
    pub fn new(
        config: QualityConfig,
        threshold: f32,
        clock: Arc<dyn Clock>,
        events: EventDispatcher,
    ) -> Self {
        Self {
            buffer: VecDeque::with_capacity(config.buffer_capacity),
            config,
            threshold,
            last_assessment: None,
            clock,
            events,
        }
    }

    pub fn process_quality_metrics(&mut self, sample: QualitySample) -> QualityVerdict {
        let assessment = self.assess(sample);
        self.add_to_buffer(assessment);

        let now = self.clock.now();
        let due = self
            .last_assessment
            .is_none_or(|last| now.duration_since(last) >= self.config.sample_interval());
        if !due {
            return QualityVerdict {
                assessment,
                should_switch: false,
                sampled: false,
            };
        }
        self.last_assessment = Some(now);

        let average = self.rolling_average();
        // Without a document in view the user has not presented anything yet;
        // switching strategy would not help.
        let should_switch = assessment.document_detected
            && self.buffer.len() >= self.config.min_samples
            && average.is_some_and(|avg| avg < self.threshold);

        tracing::debug!(
            target: "idscan::quality",
            overall = assessment.overall_score,
            average = average.unwrap_or_default(),
            buffered = self.buffer.len(),
            should_switch,
            "quality assessed"
        );
        self.events.dispatch(ScanEvent::QualityAssessed {
            assessment,
            should_switch,
        });

        QualityVerdict {
            assessment,
            should_switch,
            sampled: true,
        }
    }

    /// Appends to the rolling buffer, evicting the oldest entries once the
    /// configured capacity is exceeded.
    pub fn add_to_buffer(&mut self, entry: QualityAssessment) {
        self.buffer.push_back(entry);
        while self.buffer.len() > self.config.buffer_capacity {
            self.buffer.pop_front();
        }
    }

    pub fn calculate_overall_score(&self, sample: &QualitySample) -> f32 {
        overall_score(&self.config.weights, sample)
    }

    /// Mean overall score of the buffered assessments.
    pub fn rolling_average(&self) -> Option<f32> {
        if self.buffer.is_empty() {
            return None;
        }
        let sum: f32 = self.buffer.iter().map(|a| a.overall_score).sum();
        Some(sum / self.buffer.len() as f32)
    }

    pub fn buffered(&self) -> impl ExactSizeIterator<Item = &QualityAssessment> {
        self.buffer.iter()
    }

    pub fn last_assessment(&self) -> Option<Instant> {
        self.last_assessment
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Empties the buffer and forgets when the trend was last evaluated.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.last_assessment = None;
    }

    /// Applies new tuning. Takes effect from the next sample; the buffer is
    /// trimmed if the capacity shrank.
    pub fn reconfigure(&mut self, config: QualityConfig, threshold: f32) {
        self.config = config;
        self.threshold = threshold;
        while self.buffer.len() > self.config.buffer_capacity {
            self.buffer.pop_front();
        }
    }

    fn assess(&self, sample: QualitySample) -> QualityAssessment {
        QualityAssessment {
            blur_score: clamp_score(sample.blur),
            lighting_score: clamp_score(sample.lighting),
            positioning_score: clamp_score(sample.positioning),
            overall_score: self.calculate_overall_score(&sample),
            document_detected: sample.document_detected,
        }
    }
}

/// Weighted mean of the clamped sub-scores. Pure.
pub fn overall_score(weights: &QualityWeights, sample: &QualitySample) -> f32 {
    let total = weights.total();
    if total <= 0.0 {
        return 0.0;
    }
    let weighted = weights.blur * clamp_score(sample.blur)
        + weights.lighting * clamp_score(sample.lighting)
        + weights.positioning * clamp_score(sample.positioning);
    clamp_score(weighted / total)
}

fn clamp_score(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
