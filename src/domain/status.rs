//! Classification status types.

use serde::{Deserialize, Serialize};

/// Confidence reported for every clinical-threshold verdict.
pub const CLINICAL_RULE_CONFIDENCE: f64 = 0.95;

/// Confidence reported when no threshold table covers the parameter.
pub const UNTABULATED_CONFIDENCE: f64 = 0.5;

/// Severity of a classified parameter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum StatusCode {
    /// Inside the reference range
    Normal = 0,
    /// Below range, or a mild elevation on some parameters
    Low = 1,
    /// Above range
    High = 2,
    /// Outside the critical limits
    Critical = 3,
}

impl StatusCode {
    /// Base status name, used when no finer label is available.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::Low => "Low",
            Self::High => "High",
            Self::Critical => "Critical",
        }
    }

    #[must_use]
    pub fn is_abnormal(&self) -> bool {
        !matches!(self, Self::Normal)
    }
}

impl From<StatusCode> for u8 {
    fn from(code: StatusCode) -> Self {
        code as u8
    }
}

impl TryFrom<u8> for StatusCode {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Normal),
            1 => Ok(Self::Low),
            2 => Ok(Self::High),
            3 => Ok(Self::Critical),
            other => Err(format!("status code {other} is outside 0..=3")),
        }
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Status code plus the parameter-specific label ("Critical Low", "Prediabetic").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub code: StatusCode,
    pub label: &'static str,
    /// False when no reference range exists and the verdict is a default
    pub tabulated: bool,
}

impl Verdict {
    #[must_use]
    pub const fn new(code: StatusCode, label: &'static str) -> Self {
        Self {
            code,
            label,
            tabulated: true,
        }
    }

    #[must_use]
    pub const fn normal() -> Self {
        Self::new(StatusCode::Normal, "Normal")
    }

    /// Default Normal for a parameter without a threshold table.
    #[must_use]
    pub const fn untabulated() -> Self {
        Self {
            tabulated: false,
            ..Self::normal()
        }
    }
}

/// Which path produced a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    /// Trained statistical classifier
    Model,
    /// Deterministic clinical-threshold table
    ClinicalRules,
}

/// Outcome of one classification, produced by exactly one [`DecisionSource`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub status: StatusCode,
    pub label: String,
    /// Probability in [0, 1]
    pub confidence: f64,
    pub source: DecisionSource,
}

impl ClassificationResult {
    /// Verdict from the clinical-threshold tables. Untabulated defaults
    /// report [`UNTABULATED_CONFIDENCE`].
    #[must_use]
    pub fn from_rules(verdict: Verdict) -> Self {
        Self {
            status: verdict.code,
            label: verdict.label.to_string(),
            confidence: if verdict.tabulated {
                CLINICAL_RULE_CONFIDENCE
            } else {
                UNTABULATED_CONFIDENCE
            },
            source: DecisionSource::ClinicalRules,
        }
    }

    /// Verdict from a statistical model. The label is the base status name.
    #[must_use]
    pub fn from_model(status: StatusCode, confidence: f64) -> Self {
        Self {
            status,
            label: status.name().to_string(),
            confidence: confidence.clamp(0.0, 1.0),
            source: DecisionSource::Model,
        }
    }
}
