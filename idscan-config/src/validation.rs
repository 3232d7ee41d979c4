//! Guard rails for settings that validate but are unlikely to be intended.

use std::fmt;

use idscan_core::OrchestratorConfig;
use idscan_core::state::MIN_REMAINING_FOR_FALLBACK;

use crate::util::duration_millis;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub field: &'static str,
    pub message: String,
    pub hint: Option<String>,
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)?;
        if let Some(hint) = &self.hint {
            write!(f, " (hint: {hint})")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigWarnings(Vec<ConfigWarning>);

impl ConfigWarnings {
    pub fn push(&mut self, warning: ConfigWarning) {
        self.0.push(warning);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConfigWarning> {
        self.0.iter()
    }

    pub fn fields(&self) -> Vec<&'static str> {
        self.0.iter().map(|warning| warning.field).collect()
    }
}

impl IntoIterator for ConfigWarnings {
    type Item = ConfigWarning;
    type IntoIter = std::vec::IntoIter<ConfigWarning>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

pub fn guard_rails(config: &OrchestratorConfig) -> ConfigWarnings {
    let mut warnings = ConfigWarnings::default();
    let fallback = &config.fallback;
    let floor_ms = duration_millis(MIN_REMAINING_FOR_FALLBACK);

    let after_barcode = fallback
        .max_fallback_processing_time_ms
        .saturating_sub(fallback.barcode_timeout_ms);
    if after_barcode < floor_ms {
        warnings.push(ConfigWarning {
            field: "fallback.barcode_timeout_ms",
            message: format!(
                "barcode budget {}ms leaves {}ms of the {}ms session, below the {}ms needed to fall back",
                fallback.barcode_timeout_ms,
                after_barcode,
                fallback.max_fallback_processing_time_ms,
                floor_ms
            ),
            hint: Some(
                "lower barcode_timeout_ms or raise max_fallback_processing_time_ms".into(),
            ),
        });
    } else if fallback.ocr_timeout_ms > after_barcode {
        warnings.push(ConfigWarning {
            field: "fallback.ocr_timeout_ms",
            message: format!(
                "OCR budget {}ms exceeds the {}ms left after a barcode timeout",
                fallback.ocr_timeout_ms, after_barcode
            ),
            hint: None,
        });
    }

    if !fallback.enable_auto_fallback {
        warnings.push(ConfigWarning {
            field: "fallback.enable_auto_fallback",
            message: "auto mode will never switch strategy on its own".into(),
            hint: Some("manual switches are still honoured".into()),
        });
    }

    if config.quality.min_samples > config.quality.buffer_capacity {
        warnings.push(ConfigWarning {
            field: "quality.min_samples",
            message: format!(
                "min_samples {} exceeds buffer_capacity {}; quality can never trigger a switch",
                config.quality.min_samples, config.quality.buffer_capacity
            ),
            hint: None,
        });
    }

    let retry_window = config
        .retry
        .backoff_ms
        .saturating_mul(u64::from(config.retry.detector_attempts.saturating_sub(1)));
    if retry_window >= fallback.barcode_timeout_ms {
        warnings.push(ConfigWarning {
            field: "retry.backoff_ms",
            message: format!(
                "retry backoff of {retry_window}ms per frame uses the whole barcode budget"
            ),
            hint: Some("reduce retry.detector_attempts or retry.backoff_ms".into()),
        });
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_quiet() {
        assert!(guard_rails(&OrchestratorConfig::default()).is_empty());
    }

    #[test]
    fn flags_barcode_budget_that_blocks_fallback() {
        let mut config = OrchestratorConfig::default();
        config.fallback.barcode_timeout_ms = 4_500;
        config.fallback.max_fallback_processing_time_ms = 5_000;
        assert_eq!(
            guard_rails(&config).fields(),
            vec!["fallback.barcode_timeout_ms"]
        );
    }

    #[test]
    fn flags_unreachable_quality_switch_and_disabled_fallback() {
        let mut config = OrchestratorConfig::default();
        config.fallback.enable_auto_fallback = false;
        config.quality.min_samples = 20;
        assert_eq!(
            guard_rails(&config).fields(),
            vec!["fallback.enable_auto_fallback", "quality.min_samples"]
        );
    }
}
