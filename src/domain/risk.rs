//! Multi-parameter risk assessments.
//!
//! Independent of single-parameter interpretation: these read a whole panel
//! of values and summarise cardiovascular, diabetes, infection, anemia and
//! clotting risk plus an overall health score.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::features::neutrophil_lymphocyte_ratio;
use super::parameter::CanonicalParameter;
use super::patient::Gender;
use super::request::InterpretRequest;
use super::status::StatusCode;
use super::thresholds::classify_parameter;

/// Values for one patient, keyed by canonical key or feature name.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RiskPanel {
    pub values: BTreeMap<String, f64>,
    pub age: u32,
    pub gender: Gender,
    pub smoking: bool,
}

impl RiskPanel {
    /// Collect every numeric field of a request. The primary parameter's
    /// value is stored under `primary_key` when it resolved to a canonical
    /// key.
    #[must_use]
    pub fn from_request(request: &InterpretRequest, primary_key: Option<CanonicalParameter>) -> Self {
        let mut values = request.extra_fields.clone();
        values.extend(request.other_parameters.iter().map(|(k, v)| (k.clone(), *v)));
        if let Some(key) = primary_key {
            values.insert(key.key().to_string(), request.value);
        }
        let smoking = values.remove("smoking").is_some_and(|v| v != 0.0);
        Self {
            values,
            age: request.patient.age,
            gender: request.patient.gender,
            smoking,
        }
    }

    fn value(&self, key: &str) -> f64 {
        self.values.get(key).copied().unwrap_or(0.0)
    }

    fn nlr(&self) -> f64 {
        self.values
            .get("neutrophil_lymphocyte_ratio")
            .or_else(|| self.values.get("nlr"))
            .copied()
            .unwrap_or_else(|| {
                neutrophil_lymphocyte_ratio(self.value("neutrophils_abs"), self.value("lymphocytes_abs"))
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    None,
    Low,
    Moderate,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskFinding {
    pub level: RiskLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indication: Option<String>,
    pub factors: Vec<String>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnemiaProfile {
    #[serde(rename = "type")]
    pub kind: String,
    pub severity: String,
    pub indicators: Vec<String>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThrombosisRisk {
    /// "Normal", "Low", "Moderate", "High" or "Bleeding Risk"
    pub level: String,
    pub factors: Vec<String>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthScore {
    pub score: u8,
    pub category: String,
    pub interpretation: String,
    pub urgency: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessments {
    pub cardiovascular_risk: RiskFinding,
    pub diabetes_risk: RiskFinding,
    pub infection_risk: RiskFinding,
    pub anemia_profile: AnemiaProfile,
    pub thrombosis_risk: ThrombosisRisk,
    pub overall_health_score: HealthScore,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

/// Compute every risk assessment for a panel.
#[must_use]
pub fn assess_risks(panel: &RiskPanel) -> RiskAssessments {
    RiskAssessments {
        cardiovascular_risk: cardiovascular(panel),
        diabetes_risk: diabetes(panel),
        infection_risk: infection(panel),
        anemia_profile: anemia(panel),
        thrombosis_risk: thrombosis(panel),
        overall_health_score: health_score(panel),
    }
}

fn cardiovascular(panel: &RiskPanel) -> RiskFinding {
    let nlr = panel.nlr();
    let rdw = panel.value("rdw_percent");
    let mut level = RiskLevel::Low;
    let mut factors = Vec::new();

    if nlr > 3.5 {
        level = RiskLevel::Moderate;
        factors.push(format!("Elevated NLR: {nlr:.2} (cardiovascular risk marker)"));
    }
    if rdw > 14.5 {
        level = if level == RiskLevel::Low {
            RiskLevel::Moderate
        } else {
            RiskLevel::High
        };
        factors.push(format!("High RDW: {rdw}% (associated with heart disease)"));
    }
    if panel.age > 60 {
        factors.push(format!("Age: {} (increased risk)", panel.age));
    }
    if panel.smoking {
        level = if level == RiskLevel::Low {
            RiskLevel::Moderate
        } else {
            RiskLevel::High
        };
        factors.push("Smoking status (major risk factor)".to_string());
    }

    RiskFinding {
        level,
        indication: None,
        factors,
        recommendations: strings(&[
            "Monitor blood pressure regularly",
            "Consider lipid profile testing",
            "Lifestyle modifications: diet and exercise",
            "Consult cardiologist if risk factors present",
        ]),
    }
}

fn diabetes(panel: &RiskPanel) -> RiskFinding {
    let rbs = panel.value("random_blood_sugar_mg_dL");
    let hba1c = panel.value("hba1c_percent");
    let mut level = RiskLevel::Low;
    let mut factors = Vec::new();

    if rbs >= 200.0 {
        level = RiskLevel::High;
        factors.push(format!("RBS: {rbs} mg/dL (diabetic range)"));
    } else if rbs >= 140.0 {
        level = RiskLevel::Moderate;
        factors.push(format!("RBS: {rbs} mg/dL (prediabetic range)"));
    }

    // HbA1c overrides the glucose-based level.
    if hba1c >= 6.5 {
        level = RiskLevel::High;
        factors.push(format!("HbA1c: {hba1c}% (diabetic range)"));
    } else if hba1c >= 5.7 {
        level = RiskLevel::Moderate;
        factors.push(format!("HbA1c: {hba1c}% (prediabetic range)"));
    }

    if panel.value("wbc_10e9_L") > 9.0 {
        factors.push("Elevated WBC (associated with insulin resistance)".to_string());
    }

    RiskFinding {
        level,
        indication: Some("Based on glucose markers and inflammatory indicators".to_string()),
        factors,
        recommendations: strings(&[
            "Fasting glucose test recommended",
            "HbA1c monitoring every 3-6 months",
            "Maintain healthy weight",
            "Regular exercise program",
            "Reduce refined carbohydrates",
        ]),
    }
}

fn infection(panel: &RiskPanel) -> RiskFinding {
    let wbc = panel.value("wbc_10e9_L");
    let neutrophils = panel.value("neutrophils_percent");
    let crp = panel.value("crp_mg_L");
    let esr = panel.value("esr_mm_hr");

    let mut level = RiskLevel::None;
    let mut indication = "No active infection";
    let mut factors = Vec::new();

    if wbc > 11.0 && neutrophils > 70.0 {
        level = RiskLevel::High;
        indication = "Likely bacterial infection";
        factors.push(format!("Leukocytosis: WBC {wbc} × 10⁹/L"));
        factors.push(format!("Neutrophilia: {neutrophils}%"));
    } else if panel.values.contains_key("wbc_10e9_L") && wbc < 4.0 {
        level = RiskLevel::Moderate;
        indication = "Possible viral infection or immunosuppression";
        factors.push(format!("Leukopenia: WBC {wbc} × 10⁹/L"));
    }

    if crp > 10.0 {
        if level == RiskLevel::None {
            level = RiskLevel::High;
        }
        factors.push(format!("Elevated CRP: {crp} mg/L (active inflammation)"));
    }
    if esr > 30.0 {
        factors.push(format!("Elevated ESR: {esr} mm/hr"));
    }

    let recommendations = if level == RiskLevel::High {
        strings(&[
            "Medical evaluation needed",
            "Blood culture if fever present",
            "Complete WBC differential analysis",
            "Antibiotics may be required (consult doctor)",
        ])
    } else {
        strings(&["Continue monitoring"])
    };

    RiskFinding {
        level,
        indication: Some(indication.to_string()),
        factors,
        recommendations,
    }
}

fn anemia(panel: &RiskPanel) -> AnemiaProfile {
    let hb = panel.value("hemoglobin_g_dL");
    let mcv = panel.value("mcv_fL");
    let rdw = panel.value("rdw_percent");
    let ferritin = panel.value("ferritin_ng_mL");

    let hb_floor = if panel.gender.uses_male_ranges() { 13.5 } else { 12.0 };
    // Absent readings are not evidence of a low count.
    let hb_low = panel.values.contains_key("hemoglobin_g_dL") && hb < hb_floor;

    if !hb_low {
        return AnemiaProfile {
            kind: "No anemia".to_string(),
            severity: "Normal".to_string(),
            indicators: Vec::new(),
            recommendations: strings(&["No anemia detected"]),
        };
    }

    let mut indicators = vec![format!("Low Hb: {hb} g/dL")];
    let kind = if mcv < 80.0 {
        indicators.push(format!("Low MCV: {mcv} fL"));
        if ferritin < 30.0 {
            indicators.push(format!("Low Ferritin: {ferritin} ng/mL (confirms iron deficiency)"));
        }
        "Microcytic anemia (likely iron deficiency)"
    } else if mcv > 100.0 {
        indicators.push(format!("High MCV: {mcv} fL"));
        "Macrocytic anemia (B12/folate deficiency)"
    } else {
        indicators.push(format!("Normal MCV: {mcv} fL"));
        "Normocytic anemia"
    };
    if rdw > 14.5 {
        indicators.push(format!("High RDW: {rdw}% (mixed anemia types)"));
    }

    let severity = if hb < 7.0 {
        "Severe"
    } else if hb < 10.0 {
        "Moderate"
    } else {
        "Mild"
    };

    AnemiaProfile {
        kind: kind.to_string(),
        severity: severity.to_string(),
        indicators,
        recommendations: strings(&[
            "Iron studies (serum iron, ferritin, TIBC)",
            "Vitamin B12 and folate levels",
            "Iron supplementation if iron deficiency confirmed",
            "Investigate cause of blood loss",
            "Dietary modifications",
        ]),
    }
}

fn thrombosis(panel: &RiskPanel) -> ThrombosisRisk {
    let platelets = panel.value("platelet_count");
    let hematocrit = panel.value("hematocrit_percent");
    let mut level = "Normal";
    let mut factors = Vec::new();

    if platelets > 400.0 {
        level = "Moderate";
        factors.push(format!("Elevated platelets: {platelets} × 10³/μL (clotting risk)"));
    } else if panel.values.contains_key("platelet_count") && platelets < 150.0 {
        level = if platelets > 100.0 { "Low" } else { "Bleeding Risk" };
        factors.push(format!("Low platelets: {platelets} × 10³/μL"));
    }

    if hematocrit > 52.0 {
        level = if level == "Normal" { "Moderate" } else { "High" };
        factors.push(format!("High hematocrit: {hematocrit}% (blood viscosity)"));
    }

    let recommendations = if level == "Normal" {
        strings(&["Normal clotting profile"])
    } else {
        strings(&[
            "Consult hematologist",
            "Consider anticoagulation if high risk",
            "Stay hydrated",
            "Avoid prolonged immobility",
        ])
    };

    ThrombosisRisk {
        level: level.to_string(),
        factors,
        recommendations,
    }
}

/// Core CBC parameters counted towards the health score.
const SCORED_PARAMETERS: [CanonicalParameter; 4] = [
    CanonicalParameter::Hemoglobin,
    CanonicalParameter::WbcCount,
    CanonicalParameter::PlateletCount,
    CanonicalParameter::RbcCount,
];

fn health_score(panel: &RiskPanel) -> HealthScore {
    let mut abnormal = 0u32;
    let mut critical = 0u32;
    for param in SCORED_PARAMETERS {
        let Some(&value) = panel.values.get(param.key()) else {
            continue;
        };
        match classify_parameter(param, value, panel.gender).code {
            StatusCode::Critical => critical += 1,
            StatusCode::Low | StatusCode::High => abnormal += 1,
            StatusCode::Normal => {}
        }
    }

    let (score, category, urgency) = if critical >= 2 {
        (25, "Critical", "URGENT - Seek immediate medical attention")
    } else if critical == 1 {
        (40, "Poor", "High priority - Schedule appointment within 24-48 hours")
    } else if abnormal >= 3 {
        (60, "Fair", "Follow up within 1 week")
    } else if abnormal >= 1 {
        (75, "Good", "Routine follow-up recommended")
    } else {
        (95, "Excellent", "Continue healthy lifestyle")
    };

    HealthScore {
        score,
        category: category.to_string(),
        interpretation: format!("{abnormal} abnormal parameters, {critical} critical findings"),
        urgency: urgency.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn panel(values: &[(&str, f64)], gender: Gender) -> RiskPanel {
        RiskPanel {
            values: values.iter().map(|(k, v)| ((*k).to_string(), *v)).collect(),
            age: 45,
            gender,
            smoking: false,
        }
    }

    #[test]
    fn test_empty_panel_is_benign() {
        let risks = assess_risks(&panel(&[], Gender::Unknown));
        assert_eq!(risks.cardiovascular_risk.level, RiskLevel::Low);
        assert_eq!(risks.anemia_profile.kind, "No anemia");
        assert_eq!(risks.thrombosis_risk.level, "Normal");
        assert_eq!(risks.overall_health_score.score, 95);
        assert_eq!(risks.infection_risk.level, RiskLevel::None);
    }

    #[test]
    fn test_microcytic_anemia() {
        let risks = assess_risks(&panel(
            &[("hemoglobin_g_dL", 9.0), ("mcv_fL", 72.0), ("ferritin_ng_mL", 12.0), ("rdw_percent", 16.0)],
            Gender::Female,
        ));
        let anemia = risks.anemia_profile;
        assert!(anemia.kind.starts_with("Microcytic"));
        assert_eq!(anemia.severity, "Moderate");
        assert_eq!(anemia.indicators.len(), 4);
    }

    #[test]
    fn test_bacterial_infection_pattern() {
        let risks = assess_risks(&panel(
            &[("wbc_10e9_L", 15.0), ("neutrophils_percent", 82.0), ("esr_mm_hr", 40.0)],
            Gender::Male,
        ));
        assert_eq!(risks.infection_risk.level, RiskLevel::High);
        assert_eq!(risks.infection_risk.factors.len(), 3);
        assert_eq!(risks.infection_risk.recommendations.len(), 4);
    }

    #[test]
    fn test_cardiovascular_escalation() {
        let mut p = panel(&[("neutrophils_abs", 8.0), ("lymphocytes_abs", 2.0), ("rdw_percent", 15.0)], Gender::Male);
        p.smoking = true;
        let risk = cardiovascular(&p);
        assert_eq!(risk.level, RiskLevel::High);
        assert_eq!(risk.factors.len(), 3);
    }

    #[test]
    fn test_hba1c_overrides_glucose_level() {
        let risk = diabetes(&panel(
            &[("random_blood_sugar_mg_dL", 250.0), ("hba1c_percent", 5.9)],
            Gender::Male,
        ));
        assert_eq!(risk.level, RiskLevel::Moderate);
        assert_eq!(risk.factors.len(), 2);
    }

    #[test]
    fn test_health_score_counts_only_core_cbc() {
        let risks = assess_risks(&panel(
            &[
                ("hemoglobin_g_dL", 6.0),
                ("platelet_count", 40.0),
                ("crp_mg_L", 200.0),
            ],
            Gender::Female,
        ));
        assert_eq!(risks.overall_health_score.category, "Critical");
        assert_eq!(
            risks.overall_health_score.interpretation,
            "0 abnormal parameters, 2 critical findings"
        );
        assert_eq!(risks.thrombosis_risk.level, "Bleeding Risk");
    }

    #[test]
    fn test_panel_from_request() {
        let request = InterpretRequest::from_json(&serde_json::json!({
            "parameter": "Hemoglobin",
            "value": 11.0,
            "smoking": 1,
            "otherParameters": { "mcv_fL": 70 }
        }));
        let p = RiskPanel::from_request(&request, Some(CanonicalParameter::Hemoglobin));
        assert!(p.smoking);
        assert_eq!(p.values.get("hemoglobin_g_dL"), Some(&11.0));
        assert_eq!(p.values.get("mcv_fL"), Some(&70.0));
        assert!(!p.values.contains_key("smoking"));
    }
}
