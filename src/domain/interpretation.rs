//! Interpretation record returned to callers.

use serde::{Deserialize, Serialize};

use super::attribution::AttributionEntry;
use super::status::{DecisionSource, StatusCode};

/// Findings block, present only for non-Normal statuses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbnormalFindings {
    pub primary_finding: String,
    pub potential_causes: Vec<String>,
    pub disease_conditions: Vec<String>,
}

/// How the verdict was reached and which features drove it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Explainability {
    /// Status label ("Low", "Prediabetic", ...)
    pub model_prediction: String,
    pub status_code: StatusCode,
    /// Rounded to three decimals
    pub confidence: f64,
    pub decision_source: DecisionSource,
    pub feature_importances: Vec<AttributionEntry>,
    pub shap_explanation: String,
}

/// Patient-facing interpretation text plus explainability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interpretation {
    /// Canonical key of the interpreted parameter
    pub parameter: String,
    pub value: f64,
    pub introduction: String,
    pub general_interpretation: String,
    pub detailed_explanation: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abnormal_findings: Option<AbnormalFindings>,
    pub recommendations: Vec<String>,
    pub explainability: Explainability,
}

/// Full response: the interpretation plus raw attribution data for charts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterpretationResponse {
    #[serde(flatten)]
    pub interpretation: Interpretation,
    /// Per-feature attribution for the predicted class, aligned with
    /// `feature_names`
    pub shap_values: Option<Vec<f64>>,
    pub feature_names: Vec<String>,
    pub shap_error: Option<String>,
}

/// Round to three decimals, as reported confidences are.
#[must_use]
pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> InterpretationResponse {
        InterpretationResponse {
            interpretation: Interpretation {
                parameter: "hemoglobin_g_dL".to_string(),
                value: 10.5,
                introduction: "intro".to_string(),
                general_interpretation: "general".to_string(),
                detailed_explanation: vec!["detail".to_string()],
                abnormal_findings: None,
                recommendations: vec!["rest".to_string()],
                explainability: Explainability {
                    model_prediction: "Low".to_string(),
                    status_code: StatusCode::Low,
                    confidence: 0.95,
                    decision_source: DecisionSource::ClinicalRules,
                    feature_importances: Vec::new(),
                    shap_explanation: String::new(),
                },
            },
            shap_values: None,
            feature_names: Vec::new(),
            shap_error: None,
        }
    }

    #[test]
    fn test_response_wire_shape() {
        let value = serde_json::to_value(sample()).expect("serialize");
        assert_eq!(value["introduction"], "intro");
        assert_eq!(value["generalInterpretation"], "general");
        assert_eq!(value["explainability"]["modelPrediction"], "Low");
        assert_eq!(value["explainability"]["statusCode"], 1);
        assert_eq!(value["explainability"]["decisionSource"], "clinical_rules");
        assert!(value["shap_values"].is_null());
        assert!(value.get("abnormalFindings").is_none());
    }

    #[test]
    fn test_response_survives_json_roundtrip() {
        let original = sample();
        let json = serde_json::to_string(&original).expect("serialize");
        let parsed: InterpretationResponse = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_round3() {
        assert!((round3(0.912_345) - 0.912).abs() < 1e-12);
        assert!((round3(0.9996) - 1.0).abs() < 1e-12);
    }
}
