//! Inbound interpretation request.
//!
//! Parsing is total: malformed fields fall back to documented defaults
//! instead of failing the request.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use super::patient::{
    coerce_age, coerce_flag, coerce_number, Gender, PatientContext, Region, DEFAULT_WEIGHT_KG,
};

/// Label used when the request names no parameter at all.
pub const DEFAULT_PARAMETER: &str = "hemoglobin";

/// Accepted spellings of the parameter field, in priority order.
pub const PARAMETER_ALIASES: [&str; 3] = ["parameter", "parameter_name", "parameterName"];

/// Top-level fields with a dedicated meaning.
const RESERVED_FIELDS: [&str; 11] = [
    "parameter",
    "parameter_name",
    "parameterName",
    "value",
    "patientAge",
    "patientGender",
    "diabetic",
    "pregnant",
    "patientWeight_kg",
    "region",
    "otherParameters",
];

/// A single-parameter interpretation request.
#[derive(Debug, Clone, PartialEq)]
pub struct InterpretRequest {
    /// Parameter label exactly as the caller sent it (trimmed)
    pub parameter: String,
    /// True when no alias carried a usable label
    pub parameter_defaulted: bool,
    pub value: f64,
    pub patient: PatientContext,
    /// `otherParameters`, coerced to floats
    pub other_parameters: BTreeMap<String, f64>,
    /// Remaining top-level fields, coerced to floats
    pub extra_fields: BTreeMap<String, f64>,
}

impl InterpretRequest {
    /// Parse a request payload. Never fails.
    #[must_use]
    pub fn from_json(payload: &Value) -> Self {
        let empty = Map::new();
        let obj = payload.as_object().unwrap_or(&empty);

        let label = PARAMETER_ALIASES.iter().find_map(|alias| {
            obj.get(*alias)
                .and_then(label_text)
                .filter(|s| !s.is_empty())
        });
        let (parameter, parameter_defaulted) = match label {
            Some(label) => (label, false),
            None => (DEFAULT_PARAMETER.to_string(), true),
        };

        let patient = PatientContext {
            age: coerce_age(obj.get("patientAge")),
            gender: obj
                .get("patientGender")
                .and_then(Value::as_str)
                .map(Gender::parse)
                .unwrap_or_default(),
            gender_supplied: obj.contains_key("patientGender"),
            pregnant: obj.get("pregnant").is_some_and(coerce_flag),
            diabetic: obj.get("diabetic").is_some_and(coerce_flag),
            weight_kg: obj
                .get("patientWeight_kg")
                .filter(|v| !v.is_null())
                .map_or(DEFAULT_WEIGHT_KG, coerce_number),
            region: obj
                .get("region")
                .and_then(Value::as_str)
                .map(Region::parse)
                .unwrap_or_default(),
        };

        let other_parameters = obj
            .get("otherParameters")
            .and_then(Value::as_object)
            .map(|m| {
                m.iter()
                    .map(|(k, v)| (k.clone(), coerce_number(v)))
                    .collect()
            })
            .unwrap_or_default();

        let extra_fields = obj
            .iter()
            .filter(|(k, _)| !RESERVED_FIELDS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), coerce_number(v)))
            .collect();

        Self {
            parameter,
            parameter_defaulted,
            value: obj.get("value").map_or(0.0, coerce_number),
            patient,
            other_parameters,
            extra_fields,
        }
    }

    /// Look up a co-parameter: `otherParameters` first, then top-level
    /// fields, then 0.
    #[must_use]
    pub fn co_parameter(&self, name: &str) -> f64 {
        self.other_parameters
            .get(name)
            .or_else(|| self.extra_fields.get(name))
            .copied()
            .unwrap_or(0.0)
    }
}

fn label_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parameter_aliases_in_priority_order() {
        let req = InterpretRequest::from_json(&json!({
            "parameter": "  ",
            "parameter_name": "WBC",
            "parameterName": "Platelets",
            "value": 5.0
        }));
        assert_eq!(req.parameter, "WBC");
        assert!(!req.parameter_defaulted);
    }

    #[test]
    fn test_missing_parameter_defaults_to_hemoglobin() {
        let req = InterpretRequest::from_json(&json!({ "value": 12.0 }));
        assert_eq!(req.parameter, DEFAULT_PARAMETER);
        assert!(req.parameter_defaulted);
    }

    #[test]
    fn test_malformed_fields_use_defaults() {
        let req = InterpretRequest::from_json(&json!({
            "parameter": "Hemoglobin",
            "value": "abc",
            "patientAge": "old",
            "patientGender": 7,
            "otherParameters": "not an object"
        }));
        assert_eq!(req.value, 0.0);
        assert_eq!(
            req.patient,
            PatientContext {
                gender_supplied: true,
                ..PatientContext::default()
            }
        );
        assert!(req.other_parameters.is_empty());
    }

    #[test]
    fn test_non_object_payload_is_accepted() {
        let req = InterpretRequest::from_json(&json!([1, 2, 3]));
        assert!(req.parameter_defaulted);
        assert_eq!(req.value, 0.0);
    }

    #[test]
    fn test_co_parameter_lookup_order() {
        let req = InterpretRequest::from_json(&json!({
            "parameter": "Hemoglobin",
            "value": 13.0,
            "wbc_10e9_L": 9.0,
            "platelet_count": 210,
            "otherParameters": { "wbc_10e9_L": "6.5", "rdw_percent": "n/a" }
        }));
        assert!((req.co_parameter("wbc_10e9_L") - 6.5).abs() < f64::EPSILON);
        assert!((req.co_parameter("platelet_count") - 210.0).abs() < f64::EPSILON);
        assert_eq!(req.co_parameter("rdw_percent"), 0.0);
        assert_eq!(req.co_parameter("mcv_fL"), 0.0);
    }

    #[test]
    fn test_demographics() {
        let req = InterpretRequest::from_json(&json!({
            "parameter": "Hb",
            "value": 10.5,
            "patientAge": 35,
            "patientGender": "Female",
            "pregnant": true,
            "region": "Urban",
            "patientWeight_kg": 58.5
        }));
        assert_eq!(req.patient.age, 35);
        assert_eq!(req.patient.gender, Gender::Female);
        assert!(req.patient.gender_supplied);
        assert!(req.patient.pregnant);
        assert!(!req.patient.diabetic);
        assert_eq!(req.patient.region, Region::Urban);
        assert!((req.patient.weight_kg - 58.5).abs() < f64::EPSILON);
    }
}
