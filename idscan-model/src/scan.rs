use std::fmt;

/// Which detection strategies a session may use.
///
/// Fixed for the lifetime of a session; only [`ScanMode::Auto`] permits the
/// orchestrator to move between strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum ScanMode {
    #[default]
    Auto,
    BarcodeOnly,
    OcrOnly,
}

impl ScanMode {
    /// Strategy a new session starts with.
    pub fn initial_strategy(self) -> StrategyKind {
        match self {
            ScanMode::Auto | ScanMode::BarcodeOnly => StrategyKind::Barcode,
            ScanMode::OcrOnly => StrategyKind::Ocr,
        }
    }

    pub fn allows_switching(self) -> bool {
        matches!(self, ScanMode::Auto)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ScanMode::Auto => "auto",
            ScanMode::BarcodeOnly => "barcode-only",
            ScanMode::OcrOnly => "ocr-only",
        }
    }
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ScanMode {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(ScanMode::Auto),
            "barcode-only" | "barcode_only" | "barcode" => Ok(ScanMode::BarcodeOnly),
            "ocr-only" | "ocr_only" | "ocr" => Ok(ScanMode::OcrOnly),
            other => Err(format!("unknown scan mode '{other}'")),
        }
    }
}

/// One of the two mutually exclusive detection strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum StrategyKind {
    Barcode,
    Ocr,
}

impl StrategyKind {
    pub fn other(self) -> Self {
        match self {
            StrategyKind::Barcode => StrategyKind::Ocr,
            StrategyKind::Ocr => StrategyKind::Barcode,
        }
    }

    /// Scanning state in which this strategy is the active one.
    pub fn state(self) -> ScanState {
        match self {
            StrategyKind::Barcode => ScanState::Barcode,
            StrategyKind::Ocr => ScanState::Ocr,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StrategyKind::Barcode => "barcode",
            StrategyKind::Ocr => "ocr",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session progress state.
///
/// Allowed edges:
///
/// ```text
/// idle -> barcode | ocr
/// barcode -> completed | failed | fallback_transition
/// fallback_transition -> ocr | barcode
/// ocr -> completed | failed | fallback_transition
/// ```
///
/// `completed` and `failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ScanState {
    #[default]
    Idle,
    Barcode,
    Ocr,
    FallbackTransition,
    Completed,
    Failed,
}

impl ScanState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ScanState::Completed | ScanState::Failed)
    }

    /// Strategy that runs while in this state, if any.
    pub fn strategy(self) -> Option<StrategyKind> {
        match self {
            ScanState::Barcode => Some(StrategyKind::Barcode),
            ScanState::Ocr => Some(StrategyKind::Ocr),
            _ => None,
        }
    }

    pub fn can_transition_to(self, next: ScanState) -> bool {
        use ScanState::*;
        matches!(
            (self, next),
            (Idle, Barcode)
                | (Idle, Ocr)
                | (Barcode, Completed)
                | (Barcode, Failed)
                | (Barcode, FallbackTransition)
                | (FallbackTransition, Ocr)
                | (FallbackTransition, Barcode)
                | (Ocr, Completed)
                | (Ocr, Failed)
                | (Ocr, FallbackTransition)
        )
    }

    /// Fixed user-facing message for the state.
    pub fn message(self) -> &'static str {
        match self {
            ScanState::Idle => "Ready to scan",
            ScanState::Barcode => "Scanning barcode...",
            ScanState::Ocr => "Reading document text...",
            ScanState::FallbackTransition => "Switching to text recognition...",
            ScanState::Completed => "Scan complete",
            ScanState::Failed => "Scan failed",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ScanState::Idle => "idle",
            ScanState::Barcode => "barcode",
            ScanState::Ocr => "ocr",
            ScanState::FallbackTransition => "fallback_transition",
            ScanState::Completed => "completed",
            ScanState::Failed => "failed",
        }
    }
}

impl fmt::Display for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
