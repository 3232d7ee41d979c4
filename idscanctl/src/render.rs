use std::io::Write;

use clap::ValueEnum;
use idscan_core::ScanEvent;
use idscan_model::{ScanProgress, SessionOutcome};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Serialize)]
struct EventLine<'a> {
    at_ms: u64,
    #[serde(flatten)]
    event: &'a ScanEvent,
}

#[derive(Serialize)]
struct FinalLine<'a> {
    #[serde(rename = "final")]
    progress: &'a ScanProgress,
}

#[derive(Debug, Clone, Copy)]
pub struct Renderer {
    format: OutputFormat,
}

impl Renderer {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn event(&self, out: &mut impl Write, at_ms: u64, event: &ScanEvent) -> std::io::Result<()> {
        match self.format {
            OutputFormat::Json => {
                let line = serde_json::to_string(&EventLine { at_ms, event })?;
                writeln!(out, "{line}")
            }
            OutputFormat::Text => {
                writeln!(out, "[{at_ms:>6}ms] {:<20} {}", event.name(), describe(event))
            }
        }
    }

    pub fn progress(&self, out: &mut impl Write, progress: &ScanProgress) -> std::io::Result<()> {
        match self.format {
            OutputFormat::Json => {
                let line = serde_json::to_string(&FinalLine { progress })?;
                writeln!(out, "{line}")
            }
            OutputFormat::Text => {
                let mode = progress
                    .mode
                    .map(|mode| mode.to_string())
                    .unwrap_or_else(|| "-".into());
                writeln!(
                    out,
                    "final: state={} mode={} attempts={} elapsed={}ms ({})",
                    progress.state,
                    mode,
                    progress.barcode_attempts,
                    progress.time_elapsed_ms,
                    progress.message
                )
            }
        }
    }
}

fn describe(event: &ScanEvent) -> String {
    match event {
        ScanEvent::StateChanged { from, to, .. } => format!("{from} -> {to}"),
        ScanEvent::ProgressUpdated(progress) => format!(
            "{} attempts={} elapsed={}ms",
            progress.message, progress.barcode_attempts, progress.time_elapsed_ms
        ),
        ScanEvent::ModeSwitched {
            from, to, reason, ..
        } => format!("{from} -> {to} ({reason:?})"),
        ScanEvent::QualityAssessed {
            assessment,
            should_switch,
        } => format!(
            "score={:.2} switch={should_switch}",
            assessment.overall_score
        ),
        ScanEvent::TimedOut { kind, elapsed_ms } => format!("{kind} after {elapsed_ms}ms"),
        ScanEvent::TransitionRejected { from, to, .. } => format!("{from} -> {to} refused"),
        ScanEvent::SessionFinished { outcome, .. } => match outcome {
            SessionOutcome::Completed { strategy, data } => format!(
                "completed via {} data={}",
                strategy.map(|s| s.to_string()).unwrap_or_else(|| "-".into()),
                data.as_deref().unwrap_or("-")
            ),
            SessionOutcome::Failed { reason, message } => {
                format!("failed ({reason:?}): {message}")
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use idscan_model::{ScanState, SessionId};

    #[test]
    fn text_lines_are_prefixed_with_offset_and_name() {
        let event = ScanEvent::StateChanged {
            session_id: SessionId::new(),
            from: ScanState::Idle,
            to: ScanState::Barcode,
        };
        let mut out = Vec::new();
        Renderer::new(OutputFormat::Text)
            .event(&mut out, 120, &event)
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("[   120ms] state_changed"));
        assert!(text.contains("idle -> barcode"), "{text}");
    }

    #[test]
    fn json_lines_flatten_the_event() {
        let event = ScanEvent::TimedOut {
            kind: idscan_model::StrategyKind::Barcode,
            elapsed_ms: 3_000,
        };
        let mut out = Vec::new();
        Renderer::new(OutputFormat::Json)
            .event(&mut out, 3_000, &event)
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["event"], "timed_out");
        assert_eq!(value["at_ms"], 3_000);
        assert_eq!(value["kind"], "barcode");
    }
}
