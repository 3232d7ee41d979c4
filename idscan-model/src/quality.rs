/// Raw per-frame quality sample produced by the external frame analyzer.
///
/// Each score is expected in `[0, 1]`, higher is better.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct QualitySample {
    pub blur: f32,
    pub lighting: f32,
    pub positioning: f32,
    #[cfg_attr(feature = "serde", serde(default = "default_document_detected"))]
    pub document_detected: bool,
}

#[cfg(feature = "serde")]
fn default_document_detected() -> bool {
    true
}

impl QualitySample {
    pub fn new(blur: f32, lighting: f32, positioning: f32) -> Self {
        Self {
            blur,
            lighting,
            positioning,
            document_detected: true,
        }
    }

    pub fn without_document(mut self) -> Self {
        self.document_detected = false;
        self
    }
}

/// Derived assessment of a single frame, kept only in a short rolling buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct QualityAssessment {
    pub blur_score: f32,
    pub lighting_score: f32,
    pub positioning_score: f32,
    pub overall_score: f32,
    pub document_detected: bool,
}
