//! Patient demographics and lenient value coercion for inbound payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Age assumed when the caller omits it.
pub const DEFAULT_AGE_YEARS: u32 = 50;

/// Weight assumed when the caller omits it.
pub const DEFAULT_WEIGHT_KG: f64 = 70.0;

/// Patient gender as reported on the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
    Other,
    #[default]
    Unknown,
}

impl Gender {
    /// Parse a free-text gender. Anything unrecognised is `Unknown`.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "male" | "m" => Self::Male,
            "female" | "f" => Self::Female,
            "other" => Self::Other,
            _ => Self::Unknown,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Male => "Male",
            Self::Female => "Female",
            Self::Other => "Other",
            Self::Unknown => "Unknown",
        }
    }

    /// Whether the male reference ranges apply. Every other value uses the
    /// female ranges.
    #[must_use]
    pub fn uses_male_ranges(&self) -> bool {
        matches!(self, Self::Male)
    }
}

/// Collection region, one-hot encoded into the feature vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Region {
    North,
    South,
    East,
    West,
    Central,
    Urban,
    Rural,
    #[default]
    Unknown,
}

impl Region {
    /// One-hot order used by the feature schema.
    pub const ALL: [Self; 8] = [
        Self::North,
        Self::South,
        Self::East,
        Self::West,
        Self::Central,
        Self::Urban,
        Self::Rural,
        Self::Unknown,
    ];

    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let wanted = raw.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|r| r.as_str().eq_ignore_ascii_case(wanted))
            .unwrap_or_default()
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::North => "North",
            Self::South => "South",
            Self::East => "East",
            Self::West => "West",
            Self::Central => "Central",
            Self::Urban => "Urban",
            Self::Rural => "Rural",
            Self::Unknown => "Unknown",
        }
    }
}

/// Per-request patient attributes. Supplied by the caller, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientContext {
    /// Age in whole years
    pub age: u32,
    pub gender: Gender,
    /// False when the request carried no gender field at all
    pub gender_supplied: bool,
    pub pregnant: bool,
    pub diabetic: bool,
    /// Body weight in kg
    pub weight_kg: f64,
    pub region: Region,
}

impl PatientContext {
    /// Gender as encoded for trained models. An absent field encodes as
    /// Male; a present but unrecognised one sets no gender column.
    #[must_use]
    pub fn model_gender(&self) -> Gender {
        if self.gender_supplied {
            self.gender
        } else {
            Gender::Male
        }
    }
}

impl Default for PatientContext {
    fn default() -> Self {
        Self {
            age: DEFAULT_AGE_YEARS,
            gender: Gender::Unknown,
            gender_supplied: false,
            pregnant: false,
            diabetic: false,
            weight_kg: DEFAULT_WEIGHT_KG,
            region: Region::Unknown,
        }
    }
}

/// Coerce a JSON value to a finite float.
///
/// Numbers pass through, numeric strings are parsed, booleans become 1/0.
/// Everything else (including non-finite results) is 0.0.
#[must_use]
pub fn coerce_number(value: &Value) -> f64 {
    let parsed = match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        Value::Bool(b) => f64::from(u8::from(*b)),
        _ => 0.0,
    };
    if parsed.is_finite() {
        parsed
    } else {
        0.0
    }
}

/// Coerce a JSON value to a flag.
#[must_use]
pub fn coerce_flag(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "y"
        ),
        _ => false,
    }
}

/// Coerce an age to whole years. Negative or unparseable ages use the default.
#[must_use]
pub fn coerce_age(value: Option<&Value>) -> u32 {
    let years = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match years {
        // Saturating float-to-int cast.
        Some(y) if y.is_finite() && y >= 0.0 => y.floor() as u32,
        _ => DEFAULT_AGE_YEARS,
    }
}
