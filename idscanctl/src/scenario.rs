//! Recorded scan scenarios replayed by `idscanctl simulate`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use idscan_core::{OrchestratorConfig, RecordedFrame};
use idscan_model::{DetectorResult, QualitySample, ScanMode, StrategyKind};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    #[serde(default)]
    pub mode: Option<ScanMode>,
    /// Partial config merged over the loaded configuration.
    #[serde(default)]
    pub config: Option<Value>,
    #[serde(default)]
    pub steps: Vec<Step>,
    /// Quiet period after the last step before the final progress is read.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

fn default_settle_ms() -> u64 {
    1_000
}

/// One host interaction, `after_ms` after the previous step.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Step {
    #[serde(default)]
    pub after_ms: u64,
    #[serde(default)]
    pub quality: Option<QualitySample>,
    #[serde(default)]
    pub barcode: Option<DetectorResult>,
    #[serde(default)]
    pub ocr: Option<DetectorResult>,
    #[serde(default)]
    pub action: Option<Action>,
}

impl Step {
    /// The recorded frame to hand to the detector, if this step carries one.
    pub fn frame(&self) -> Option<RecordedFrame> {
        if self.barcode.is_none() && self.ocr.is_none() {
            return None;
        }
        Some(RecordedFrame {
            barcode: self.barcode.clone(),
            ocr: self.ocr.clone(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Start {
        #[serde(default)]
        mode: Option<ScanMode>,
    },
    Switch {
        to: StrategyKind,
    },
    Cancel,
    Reset,
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("invalid scenario {}", path.display()))
    }

    /// Overlay the scenario's partial config on `base` and validate the result.
    pub fn effective_config(&self, base: &OrchestratorConfig) -> Result<OrchestratorConfig> {
        let Some(overlay) = &self.config else {
            return Ok(base.clone());
        };
        let mut merged = serde_json::to_value(base)?;
        merge(&mut merged, overlay);
        let config: OrchestratorConfig =
            serde_json::from_value(merged).context("invalid scenario config")?;
        config.validate().context("invalid scenario config")?;
        Ok(config)
    }
}

fn merge(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(key) {
                    Some(slot) => merge(slot, value),
                    None => {
                        base.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (slot, value) => *slot = value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn partial_config_keeps_unspecified_fields() {
        let scenario: Scenario = serde_json::from_value(json!({
            "mode": "auto",
            "config": { "fallback": { "max_barcode_attempts": 2 } },
            "steps": []
        }))
        .unwrap();

        let config = scenario
            .effective_config(&OrchestratorConfig::default())
            .unwrap();
        assert_eq!(config.fallback.max_barcode_attempts, 2);
        assert_eq!(config.fallback.barcode_timeout_ms, 10_000);
        assert_eq!(scenario.settle_ms, 1_000);
    }

    #[test]
    fn invalid_overlay_is_rejected() {
        let scenario: Scenario = serde_json::from_value(json!({
            "config": { "fallback": { "barcode_timeout_ms": 0 } }
        }))
        .unwrap();
        assert!(
            scenario
                .effective_config(&OrchestratorConfig::default())
                .is_err()
        );
    }

    #[test]
    fn steps_parse_frames_and_actions() {
        let scenario: Scenario = serde_json::from_value(json!({
            "steps": [
                { "after_ms": 100, "barcode": { "success": true, "data": "PDF417" } },
                { "after_ms": 50, "action": { "type": "switch", "to": "ocr" } },
                { "quality": { "blur": 0.2, "lighting": 0.3, "positioning": 0.1 } }
            ]
        }))
        .unwrap();

        assert_eq!(scenario.mode, None);
        let frame = scenario.steps[0].frame().unwrap();
        assert_eq!(frame.barcode, Some(DetectorResult::success("PDF417")));
        assert_eq!(
            scenario.steps[1].action,
            Some(Action::Switch {
                to: StrategyKind::Ocr
            })
        );
        assert!(scenario.steps[2].frame().is_none());
        assert!(scenario.steps[2].quality.unwrap().document_detected);
    }
}
