//! Fallback policy. Pure functions over configuration, mode, attempt count
//! and elapsed time.

use std::time::Duration;

use idscan_model::{FallbackDecision, FallbackReason, ScanMode};

use crate::config::FallbackConfig;

/// Below this much remaining session budget a switch cannot finish in time
/// and the session should fail fast instead.
pub const MIN_REMAINING_FOR_FALLBACK: Duration = Duration::from_millis(1_000);

fn remaining(config: &FallbackConfig, elapsed: Duration) -> Duration {
    config.max_processing_time().saturating_sub(elapsed)
}

/// Decides whether the barcode strategy should give way to OCR.
///
/// Checked in order: mode restriction, insufficient remaining time, barcode
/// budget exhausted, attempt ceiling reached. Anything else is refused as
/// `error_type`.
pub fn evaluate_fallback(
    mode: ScanMode,
    config: &FallbackConfig,
    barcode_attempts: u32,
    elapsed: Duration,
) -> FallbackDecision {
    let remaining = remaining(config, elapsed);
    let remaining_ms = remaining.as_millis() as u64;

    if mode != ScanMode::Auto {
        return FallbackDecision::refuse(FallbackReason::ModeRestriction, remaining_ms);
    }
    if remaining < MIN_REMAINING_FOR_FALLBACK {
        return FallbackDecision::refuse(FallbackReason::InsufficientTime, remaining_ms);
    }
    if elapsed >= config.barcode_timeout() {
        return FallbackDecision::approve(FallbackReason::Timeout, remaining_ms);
    }
    if barcode_attempts >= config.max_barcode_attempts {
        return FallbackDecision::approve(FallbackReason::MaxAttempts, remaining_ms);
    }
    FallbackDecision::refuse(FallbackReason::ErrorType, remaining_ms)
}

/// Same gates as [`evaluate_fallback`], approving with `quality` once the
/// mode and time checks pass.
pub fn evaluate_quality_fallback(
    mode: ScanMode,
    config: &FallbackConfig,
    elapsed: Duration,
) -> FallbackDecision {
    let remaining = remaining(config, elapsed);
    let remaining_ms = remaining.as_millis() as u64;

    if mode != ScanMode::Auto {
        return FallbackDecision::refuse(FallbackReason::ModeRestriction, remaining_ms);
    }
    if remaining < MIN_REMAINING_FOR_FALLBACK {
        return FallbackDecision::refuse(FallbackReason::InsufficientTime, remaining_ms);
    }
    FallbackDecision::approve(FallbackReason::Quality, remaining_ms)
}
