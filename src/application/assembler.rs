//! Result assembler: classification + attributions + template text.

use crate::domain::{
    round3, AbnormalFindings, AttributionEntry, CanonicalParameter, ClassificationResult,
    Direction, Explainability, Interpretation, InterpretationResponse,
};
use crate::ports::{TemplateBlock, TemplateCatalog};

use super::explain::Explanation;

/// Narrative shown when no attribution survived.
pub const NO_ATTRIBUTION_NARRATIVE: &str = "Model prediction based on all available features.";

/// How many attributions the narrative mentions.
const NARRATIVE_FEATURES: usize = 3;

/// Builds interpretation records. The only caller of the template catalog.
pub struct ResultAssembler<T: TemplateCatalog> {
    templates: T,
}

impl<T: TemplateCatalog> ResultAssembler<T> {
    pub fn new(templates: T) -> Self {
        Self { templates }
    }

    /// Template for a status label.
    ///
    /// Sub-state labels fall back to their head ("Low - Hyperthyroid" to
    /// "Low") and then to the base name of their status code
    /// ("Critical Low" to "Critical").
    fn template_for(&self, parameter: &str, result: &ClassificationResult) -> Option<TemplateBlock> {
        let head = result.label.split(" - ").next().unwrap_or(&result.label);
        [result.label.as_str(), head, result.status.name()]
            .into_iter()
            .find_map(|label| self.templates.lookup(parameter, label))
    }

    /// Assemble the response for `parameter` (a canonical key).
    #[must_use]
    pub fn assemble(
        &self,
        parameter: &str,
        value: f64,
        result: &ClassificationResult,
        explanation: &Explanation,
        feature_names: Vec<String>,
    ) -> InterpretationResponse {
        let display = CanonicalParameter::from_key(parameter)
            .map_or_else(|| parameter.to_string(), |p| p.display_name().to_string());
        let template = self.template_for(parameter, result).unwrap_or_else(|| {
            tracing::warn!(parameter, label = %result.label, "No template; using generic text");
            generic_template(&display, value, &result.label)
        });

        let abnormal_findings = result.status.is_abnormal().then(|| AbnormalFindings {
            primary_finding: template
                .abnormal_primary
                .clone()
                .unwrap_or_else(|| format!("{} {display}", result.label)),
            potential_causes: template.potential_causes.clone(),
            disease_conditions: template.disease_conditions.clone(),
        });

        let interpretation = Interpretation {
            parameter: parameter.to_string(),
            value,
            introduction: template.intro,
            general_interpretation: template.general,
            detailed_explanation: template.detailed,
            abnormal_findings,
            recommendations: template.recommendations,
            explainability: Explainability {
                model_prediction: result.label.clone(),
                status_code: result.status,
                confidence: round3(result.confidence),
                decision_source: result.source,
                feature_importances: explanation.entries.clone(),
                shap_explanation: narrative(&explanation.entries),
            },
        };

        InterpretationResponse {
            interpretation,
            shap_values: explanation.values.clone(),
            feature_names,
            shap_error: explanation.error.clone(),
        }
    }
}

fn generic_template(display: &str, value: f64, label: &str) -> TemplateBlock {
    TemplateBlock {
        intro: format!("Your {display} level is {value}."),
        general: format!("Status: {label}"),
        recommendations: vec!["Consult your healthcare provider for interpretation".to_string()],
        ..TemplateBlock::default()
    }
}

/// One-sentence summary of the strongest attributions.
#[must_use]
pub fn narrative(entries: &[AttributionEntry]) -> String {
    if entries.is_empty() {
        return NO_ATTRIBUTION_NARRATIVE.to_string();
    }
    let parts: Vec<String> = entries
        .iter()
        .take(NARRATIVE_FEATURES)
        .map(|e| {
            let verb = match e.direction {
                Direction::Increases => "increases",
                Direction::Decreases => "decreases",
                Direction::Importance => "influences",
            };
            format!("{} {verb} the prediction (impact: {:.2})", e.feature, e.impact.abs())
        })
        .collect();
    format!("Key factors influencing this prediction: {}", parts.join("; "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::JsonTemplateCatalog;
    use crate::domain::{AttributionMethod, StatusCode, Verdict};

    fn assembler() -> ResultAssembler<JsonTemplateCatalog> {
        ResultAssembler::new(JsonTemplateCatalog::embedded().expect("catalog"))
    }

    fn entry(feature: &str, impact: f64, direction: Direction) -> AttributionEntry {
        AttributionEntry {
            feature: feature.to_string(),
            impact,
            direction,
            method: AttributionMethod::Perturbation,
        }
    }

    #[test]
    fn test_rules_verdict_uses_template() {
        let result = ClassificationResult::from_rules(Verdict::new(StatusCode::Low, "Low"));
        let response = assembler().assemble(
            "hemoglobin_g_dL",
            10.5,
            &result,
            &Explanation::default(),
            Vec::new(),
        );
        let interp = &response.interpretation;
        assert!(interp.introduction.contains("anemia"));
        assert_eq!(interp.explainability.confidence, 0.95);
        assert!(interp.explainability.feature_importances.is_empty());
        assert_eq!(interp.explainability.shap_explanation, NO_ATTRIBUTION_NARRATIVE);
        let findings = interp.abnormal_findings.as_ref().expect("findings");
        assert_eq!(findings.primary_finding, "Low Hemoglobin (Anemia)");
        assert!(response.shap_values.is_none());
        assert!(response.feature_names.is_empty());
    }

    #[test]
    fn test_sub_labels_fall_back_to_base_status() {
        let result = ClassificationResult::from_rules(Verdict::new(StatusCode::Critical, "Critical Low"));
        let response = assembler().assemble("hemoglobin_g_dL", 6.0, &result, &Explanation::default(), Vec::new());
        assert!(response.interpretation.introduction.contains("critically"));
        assert_eq!(response.interpretation.explainability.model_prediction, "Critical Low");

        let result = ClassificationResult::from_rules(Verdict::new(StatusCode::High, "Low - Hyperthyroid"));
        let response = assembler().assemble("tsh_mIU_L", 0.1, &result, &Explanation::default(), Vec::new());
        let low = JsonTemplateCatalog::embedded()
            .expect("catalog")
            .lookup("tsh_mIU_L", "Low")
            .expect("template");
        assert_eq!(response.interpretation.introduction, low.intro);
    }

    #[test]
    fn test_generic_template_for_unknown_parameter() {
        let result = ClassificationResult::from_rules(Verdict::normal());
        let response = assembler().assemble("lipase_u_l", 40.0, &result, &Explanation::default(), Vec::new());
        let interp = &response.interpretation;
        assert_eq!(interp.introduction, "Your lipase_u_l level is 40.");
        assert_eq!(interp.general_interpretation, "Status: Normal");
        assert_eq!(interp.recommendations.len(), 1);
        assert!(interp.abnormal_findings.is_none());

        let high = ClassificationResult::from_rules(Verdict::new(StatusCode::High, "High"));
        let response = assembler().assemble("lipase_u_l", 400.0, &high, &Explanation::default(), Vec::new());
        let findings = response.interpretation.abnormal_findings.expect("findings");
        assert_eq!(findings.primary_finding, "High lipase_u_l");
    }

    #[test]
    fn test_model_response_carries_raw_attributions() {
        let result = ClassificationResult::from_model(StatusCode::High, 0.83456);
        let explanation = Explanation {
            entries: vec![entry("nlr", 0.42, Direction::Increases)],
            values: Some(vec![0.0, 0.42]),
            method: Some(AttributionMethod::Perturbation),
            error: None,
        };
        let names = vec!["patientAge".to_string(), "nlr".to_string()];
        let response = assembler().assemble("wbc_10e9_L", 14.0, &result, &explanation, names.clone());
        assert_eq!(response.interpretation.explainability.confidence, 0.835);
        assert_eq!(response.shap_values, Some(vec![0.0, 0.42]));
        assert_eq!(response.feature_names, names);
        assert!(response
            .interpretation
            .explainability
            .shap_explanation
            .contains("nlr increases the prediction (impact: 0.42)"));
    }

    #[test]
    fn test_model_inputs_survive_failed_attribution() {
        let result = ClassificationResult::from_model(StatusCode::Normal, 0.7);
        let names = vec!["patientAge".to_string(), "nlr".to_string()];
        let response = assembler().assemble(
            "wbc_10e9_L",
            7.0,
            &result,
            &Explanation::failed("All attribution strategies failed: none"),
            names.clone(),
        );
        assert_eq!(response.feature_names, names);
        assert!(response.shap_values.is_none());
        assert!(response.shap_error.is_some());
        assert_eq!(
            response.interpretation.explainability.shap_explanation,
            NO_ATTRIBUTION_NARRATIVE
        );
    }

    #[test]
    fn test_narrative_mentions_top_three() {
        let entries = vec![
            entry("a", -0.9, Direction::Decreases),
            entry("b", 0.5, Direction::Increases),
            entry("c", 0.3, Direction::Importance),
            entry("d", 0.2, Direction::Increases),
        ];
        let text = narrative(&entries);
        assert!(text.contains("a decreases the prediction (impact: 0.90)"));
        assert!(text.contains("c influences"));
        assert!(!text.contains("d increases"));
    }
}
