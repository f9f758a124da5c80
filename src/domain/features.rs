//! Feature vector builder.
//!
//! Turns a request into the fixed, versioned feature schema the trained
//! classifiers were fitted on. Building never fails; selecting the columns a
//! particular model needs happens later in [`FeatureVector::reindex`].

use std::collections::HashSet;

use super::patient::{Gender, Region};
use super::request::InterpretRequest;

/// Version of the built feature schema.
pub const FEATURE_SCHEMA_VERSION: u32 = 1;

/// Raw co-parameters copied into the vector, in schema order.
pub const CO_PARAMETERS: [&str; 16] = [
    "hemoglobin_g_dL",
    "wbc_10e9_L",
    "platelet_count",
    "rdw_percent",
    "neutrophils_percent",
    "lymphocytes_percent",
    "monocytes_percent",
    "eosinophils_percent",
    "basophils_percent",
    "rbc_count",
    "mcv_fL",
    "mch_pg",
    "mchc_g_dL",
    "neutrophils_abs",
    "lymphocytes_abs",
    "monocytes_abs",
];

/// Parameters with z-score and outlier-flag placeholders.
const PLACEHOLDER_PARAMETERS: [&str; 3] = ["hemoglobin_g_dL", "wbc_10e9_L", "platelet_count"];

/// Ordered feature names and values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeatureVector {
    names: Vec<String>,
    values: Vec<f64>,
}

/// Expected schema that cannot be satisfied by reindexing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("Model declares no input features")]
    Empty,

    #[error("Model declares feature '{0}' more than once")]
    Duplicate(String),
}

impl FeatureVector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a feature. A repeated name overwrites the earlier value.
    pub fn push(&mut self, name: impl Into<String>, value: f64) {
        let name = name.into();
        if let Some(idx) = self.names.iter().position(|n| *n == name) {
            self.values[idx] = value;
        } else {
            self.names.push(name);
            self.values.push(value);
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<f64> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|idx| self.values[idx])
    }

    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Project onto a model's expected schema.
    ///
    /// Missing features are filled with 0 and extra built features are
    /// dropped.
    ///
    /// # Errors
    /// Returns [`SchemaError`] if the expected schema is empty or repeats a
    /// name, since no projection can satisfy it.
    pub fn reindex(&self, expected: &[String]) -> Result<Self, SchemaError> {
        if expected.is_empty() {
            return Err(SchemaError::Empty);
        }
        let mut seen = HashSet::with_capacity(expected.len());
        let mut missing = 0usize;
        let mut values = Vec::with_capacity(expected.len());
        for name in expected {
            if !seen.insert(name.as_str()) {
                return Err(SchemaError::Duplicate(name.clone()));
            }
            values.push(self.get(name).unwrap_or_else(|| {
                missing += 1;
                0.0
            }));
        }
        if missing > 0 {
            tracing::debug!(missing, expected = expected.len(), "Filled missing model features with 0");
        }
        Ok(Self {
            names: expected.to_vec(),
            values,
        })
    }
}

/// Neutrophil/lymphocyte ratio, 0 when the lymphocyte count is not positive.
#[must_use]
pub fn neutrophil_lymphocyte_ratio(neutrophils_abs: f64, lymphocytes_abs: f64) -> f64 {
    if lymphocytes_abs > 0.0 {
        let ratio = neutrophils_abs / lymphocytes_abs;
        if ratio.is_finite() {
            ratio
        } else {
            0.0
        }
    } else {
        0.0
    }
}

fn flag(on: bool) -> f64 {
    f64::from(u8::from(on))
}

/// Names of the built schema, in build order.
#[must_use]
pub fn schema_feature_names() -> Vec<String> {
    build_features(&InterpretRequest::from_json(&serde_json::Value::Null))
        .names
}

/// Build the full feature vector for a request.
#[must_use]
pub fn build_features(request: &InterpretRequest) -> FeatureVector {
    let patient = &request.patient;
    let mut fv = FeatureVector::new();

    fv.push("patientAge", f64::from(patient.age));
    fv.push("diabetic", flag(patient.diabetic));
    fv.push("pregnant", flag(patient.pregnant));

    let gender = patient.model_gender();
    fv.push("gender_Female", flag(gender == Gender::Female));
    fv.push("gender_Male", flag(gender == Gender::Male));
    fv.push("gender_Other", flag(gender == Gender::Other));

    for region in Region::ALL {
        fv.push(format!("region_{}", region.as_str()), flag(patient.region == region));
    }

    let age = patient.age;
    fv.push("age_young", flag(age < 30));
    fv.push("age_middle", flag((30..50).contains(&age)));
    fv.push("age_senior", flag((50..65).contains(&age)));
    fv.push("age_elderly", flag(age >= 65));

    for name in CO_PARAMETERS {
        fv.push(name, request.co_parameter(name));
    }

    for name in PLACEHOLDER_PARAMETERS {
        fv.push(format!("{name}_zscore"), 0.0);
    }

    let nlr = neutrophil_lymphocyte_ratio(
        request.co_parameter("neutrophils_abs"),
        request.co_parameter("lymphocytes_abs"),
    );
    fv.push("nlr", nlr);

    for name in PLACEHOLDER_PARAMETERS {
        fv.push(format!("{name}_outlier"), 0.0);
    }

    fv.push("patientWeight_kg", patient.weight_kg);
    fv.push("neutrophil_lymphocyte_ratio", nlr);

    tracing::debug!(
        features = fv.len(),
        schema = FEATURE_SCHEMA_VERSION,
        "Built feature vector"
    );
    fv
}
