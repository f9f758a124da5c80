//! Canonical lab parameters and free-text parameter name normalization.
//!
//! Reports label the same analyte in many ways ("Hemoglobin (Hb)",
//! "HAEMOGLOBIN", "Hb"). Everything downstream (threshold tables, model
//! artifacts, templates) is keyed by one canonical key per analyte.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Supported lab parameters.
///
/// Every variant has exactly one threshold table in
/// [`classify_by_threshold`](crate::domain::classify_by_threshold) and at most one
/// trained model artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CanonicalParameter {
    #[serde(rename = "hemoglobin_g_dL")]
    Hemoglobin,
    #[serde(rename = "rbc_count")]
    RbcCount,
    #[serde(rename = "wbc_10e9_L")]
    WbcCount,
    #[serde(rename = "platelet_count")]
    PlateletCount,
    #[serde(rename = "hematocrit_percent")]
    Hematocrit,
    #[serde(rename = "mcv_fL")]
    Mcv,
    #[serde(rename = "mch_pg")]
    Mch,
    #[serde(rename = "mchc_g_dL")]
    Mchc,
    #[serde(rename = "rdw_percent")]
    Rdw,
    #[serde(rename = "neutrophils_percent")]
    Neutrophils,
    #[serde(rename = "lymphocytes_percent")]
    Lymphocytes,
    #[serde(rename = "monocytes_percent")]
    Monocytes,
    #[serde(rename = "eosinophils_percent")]
    Eosinophils,
    #[serde(rename = "basophils_percent")]
    Basophils,
    #[serde(rename = "random_blood_sugar_mg_dL")]
    RandomBloodSugar,
    #[serde(rename = "hba1c_percent")]
    Hba1c,
    #[serde(rename = "esr_mm_hr")]
    Esr,
    #[serde(rename = "crp_mg_L")]
    Crp,
    #[serde(rename = "serum_creatinine_mg_dL")]
    SerumCreatinine,
    #[serde(rename = "serum_iron_mcg_dL")]
    SerumIron,
    #[serde(rename = "tibc_mcg_dL")]
    Tibc,
    #[serde(rename = "transferrin_saturation_percent")]
    TransferrinSaturation,
    #[serde(rename = "ferritin_ng_mL")]
    Ferritin,
    #[serde(rename = "vitamin_b12_pg_mL")]
    VitaminB12,
    #[serde(rename = "vitamin_d_ng_mL")]
    VitaminD,
    #[serde(rename = "tsh_mIU_L")]
    Tsh,
    #[serde(rename = "cortisol_pm_mcg_dL")]
    CortisolPm,
}

impl CanonicalParameter {
    /// All supported parameters, CBC first.
    pub const ALL: [Self; 27] = [
        Self::Hemoglobin,
        Self::RbcCount,
        Self::WbcCount,
        Self::PlateletCount,
        Self::Hematocrit,
        Self::Mcv,
        Self::Mch,
        Self::Mchc,
        Self::Rdw,
        Self::Neutrophils,
        Self::Lymphocytes,
        Self::Monocytes,
        Self::Eosinophils,
        Self::Basophils,
        Self::RandomBloodSugar,
        Self::Hba1c,
        Self::Esr,
        Self::Crp,
        Self::SerumCreatinine,
        Self::SerumIron,
        Self::Tibc,
        Self::TransferrinSaturation,
        Self::Ferritin,
        Self::VitaminB12,
        Self::VitaminD,
        Self::Tsh,
        Self::CortisolPm,
    ];

    /// Canonical key used for thresholds, model files and templates.
    #[must_use]
    pub fn key(&self) -> &'static str {
        match self {
            Self::Hemoglobin => "hemoglobin_g_dL",
            Self::RbcCount => "rbc_count",
            Self::WbcCount => "wbc_10e9_L",
            Self::PlateletCount => "platelet_count",
            Self::Hematocrit => "hematocrit_percent",
            Self::Mcv => "mcv_fL",
            Self::Mch => "mch_pg",
            Self::Mchc => "mchc_g_dL",
            Self::Rdw => "rdw_percent",
            Self::Neutrophils => "neutrophils_percent",
            Self::Lymphocytes => "lymphocytes_percent",
            Self::Monocytes => "monocytes_percent",
            Self::Eosinophils => "eosinophils_percent",
            Self::Basophils => "basophils_percent",
            Self::RandomBloodSugar => "random_blood_sugar_mg_dL",
            Self::Hba1c => "hba1c_percent",
            Self::Esr => "esr_mm_hr",
            Self::Crp => "crp_mg_L",
            Self::SerumCreatinine => "serum_creatinine_mg_dL",
            Self::SerumIron => "serum_iron_mcg_dL",
            Self::Tibc => "tibc_mcg_dL",
            Self::TransferrinSaturation => "transferrin_saturation_percent",
            Self::Ferritin => "ferritin_ng_mL",
            Self::VitaminB12 => "vitamin_b12_pg_mL",
            Self::VitaminD => "vitamin_d_ng_mL",
            Self::Tsh => "tsh_mIU_L",
            Self::CortisolPm => "cortisol_pm_mcg_dL",
        }
    }

    /// Look up a parameter by its exact canonical key.
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|p| p.key() == key)
    }

    /// Human-readable label as printed on reports.
    #[must_use]
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Hemoglobin => "Hemoglobin (Hb)",
            Self::RbcCount => "RBC Count",
            Self::WbcCount => "Total WBC Count",
            Self::PlateletCount => "Platelet Count",
            Self::Hematocrit => "Hematocrit (PCV)",
            Self::Mcv => "Mean Corpuscular Volume (MCV)",
            Self::Mch => "Mean Corpuscular Hemoglobin (MCH)",
            Self::Mchc => "Mean Corpuscular Hemoglobin Concentration (MCHC)",
            Self::Rdw => "Red Cell Distribution Width (RDW)",
            Self::Neutrophils => "Neutrophils",
            Self::Lymphocytes => "Lymphocytes",
            Self::Monocytes => "Monocytes",
            Self::Eosinophils => "Eosinophils",
            Self::Basophils => "Basophils",
            Self::RandomBloodSugar => "Random Blood Sugar",
            Self::Hba1c => "HbA1c",
            Self::Esr => "ESR",
            Self::Crp => "C-Reactive Protein (CRP)",
            Self::SerumCreatinine => "Serum Creatinine",
            Self::SerumIron => "Serum Iron",
            Self::Tibc => "TIBC",
            Self::TransferrinSaturation => "Transferrin Saturation",
            Self::Ferritin => "Ferritin",
            Self::VitaminB12 => "Vitamin B12",
            Self::VitaminD => "Vitamin D (25-OH)",
            Self::Tsh => "TSH",
            Self::CortisolPm => "Cortisol PM",
        }
    }
}

impl std::fmt::Display for CanonicalParameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// How a rule tests the cleaned input.
#[derive(Debug, Clone, Copy)]
enum Pattern {
    /// Substring anywhere in the cleaned text.
    Phrase(&'static str),
    /// Whole whitespace-separated token. Used for short acronyms that would
    /// otherwise match inside unrelated words.
    Token(&'static str),
    /// The entire cleaned text.
    Exact(&'static str),
}

impl Pattern {
    fn matches(&self, cleaned: &str) -> bool {
        match self {
            Self::Phrase(p) => cleaned.contains(p),
            Self::Token(t) => cleaned.split_whitespace().any(|w| w == *t),
            Self::Exact(e) => cleaned == *e,
        }
    }
}

struct Rule {
    target: CanonicalParameter,
    any_of: &'static [Pattern],
}

use CanonicalParameter as P;
use Pattern::{Exact, Phrase, Token};

/// Ordered rules; first match wins.
///
/// MCHC precedes MCH precedes MCV/HbA1c precede hemoglobin: all of them
/// contain "hemoglobin" (or "mch") textually. RDW and ESR precede RBC
/// because "red cell distribution" and "erythrocyte sedimentation" would
/// otherwise read as red-cell counts.
static RULES: &[Rule] = &[
    Rule {
        target: P::Mchc,
        any_of: &[
            Phrase("mean corpuscular haemoglobin concentration"),
            Phrase("mean corpuscular hemoglobin concentration"),
            Phrase("mchc"),
        ],
    },
    Rule {
        target: P::Mch,
        any_of: &[
            Phrase("mean corpuscular haemoglobin"),
            Phrase("mean corpuscular hemoglobin"),
            Phrase("mch"),
        ],
    },
    Rule {
        target: P::Mcv,
        any_of: &[Phrase("mean corpuscular volume"), Phrase("mcv")],
    },
    Rule {
        target: P::Hba1c,
        any_of: &[
            Phrase("hba1c"),
            Phrase("a1c"),
            Phrase("glycated"),
            Phrase("glycosylated"),
        ],
    },
    Rule {
        target: P::Hemoglobin,
        any_of: &[Phrase("hemoglobin"), Phrase("haemoglobin"), Exact("hb")],
    },
    Rule {
        target: P::Rdw,
        any_of: &[Phrase("rdw"), Phrase("red cell distribution")],
    },
    Rule {
        target: P::WbcCount,
        any_of: &[
            Phrase("wbc"),
            Phrase("white"),
            Phrase("leukocyte"),
            Phrase("leucocyte"),
            Token("tlc"),
        ],
    },
    Rule {
        target: P::PlateletCount,
        any_of: &[Phrase("platelet"), Token("plt")],
    },
    Rule {
        target: P::Neutrophils,
        any_of: &[Phrase("neutrophil")],
    },
    Rule {
        target: P::Lymphocytes,
        any_of: &[Phrase("lymphocyte")],
    },
    Rule {
        target: P::Eosinophils,
        any_of: &[Phrase("eosinophil")],
    },
    Rule {
        target: P::Basophils,
        any_of: &[Phrase("basophil")],
    },
    Rule {
        target: P::Monocytes,
        any_of: &[Phrase("monocyte")],
    },
    Rule {
        target: P::Esr,
        any_of: &[Token("esr"), Phrase("sedimentation")],
    },
    Rule {
        target: P::RbcCount,
        any_of: &[
            Phrase("rbc"),
            Phrase("red blood"),
            Phrase("red cell"),
            Phrase("erythrocyte count"),
        ],
    },
    Rule {
        target: P::Hematocrit,
        any_of: &[
            Phrase("haematocrit"),
            Phrase("hematocrit"),
            Phrase("packed cell"),
            Token("pcv"),
            Token("hct"),
        ],
    },
    Rule {
        target: P::RandomBloodSugar,
        any_of: &[
            Phrase("random blood sugar"),
            Token("rbs"),
            Phrase("blood sugar"),
            Phrase("glucose"),
        ],
    },
    Rule {
        target: P::Crp,
        any_of: &[Token("crp"), Phrase("c reactive")],
    },
    Rule {
        target: P::SerumCreatinine,
        any_of: &[Phrase("creatinine")],
    },
    Rule {
        target: P::Tibc,
        any_of: &[Token("tibc"), Phrase("iron binding")],
    },
    Rule {
        target: P::TransferrinSaturation,
        any_of: &[Phrase("transferrin"), Token("tsat")],
    },
    Rule {
        target: P::Ferritin,
        any_of: &[Phrase("ferritin")],
    },
    Rule {
        target: P::SerumIron,
        any_of: &[Phrase("serum iron"), Token("iron")],
    },
    Rule {
        target: P::VitaminB12,
        any_of: &[Token("b12"), Phrase("vitamin b 12"), Phrase("cobalamin")],
    },
    Rule {
        target: P::VitaminD,
        any_of: &[Phrase("vitamin d"), Phrase("25 oh"), Phrase("calcidiol")],
    },
    Rule {
        target: P::Tsh,
        any_of: &[Token("tsh"), Phrase("thyroid stimulating")],
    },
    Rule {
        target: P::CortisolPm,
        any_of: &[Phrase("cortisol")],
    },
];

fn parenthetical() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\(.*?\)").expect("Valid regex"))
}

fn non_alphanumeric() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-z0-9]+").expect("Valid regex"))
}

/// Lowercase, drop parenthetical content, turn every non-alphanumeric run
/// into a single space.
#[must_use]
pub fn clean_parameter_label(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let without_parens = parenthetical().replace_all(&lowered, " ");
    non_alphanumeric()
        .replace_all(&without_parens, " ")
        .trim()
        .to_string()
}

/// Match a label against the rule table only.
#[must_use]
pub fn match_canonical(raw: &str) -> Option<CanonicalParameter> {
    let cleaned = clean_parameter_label(raw);
    match_cleaned(&cleaned)
}

fn match_cleaned(cleaned: &str) -> Option<CanonicalParameter> {
    if cleaned.is_empty() {
        return None;
    }
    RULES
        .iter()
        .find(|rule| rule.any_of.iter().any(|p| p.matches(cleaned)))
        .map(|rule| rule.target)
}

/// Normalize an arbitrary parameter label to a canonical key.
///
/// Never fails. Unmatched labels fall back to any already-loaded model key
/// contained in the cleaned label, then to the cleaned label with spaces
/// replaced by underscores. Empty input yields an empty string.
#[must_use]
pub fn normalize_parameter_name<I, S>(raw: &str, loaded_keys: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let cleaned = clean_parameter_label(raw);
    if let Some(param) = match_cleaned(&cleaned) {
        return param.key().to_string();
    }

    for key in loaded_keys {
        let key = key.as_ref();
        let spaced = key.to_lowercase().replace('_', " ");
        if !spaced.is_empty() && cleaned.contains(&spaced) {
            return key.to_string();
        }
    }

    cleaned.replace(' ', "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalize(raw: &str) -> String {
        normalize_parameter_name(raw, std::iter::empty::<&str>())
    }

    #[test]
    fn test_canonical_keys_are_idempotent() {
        for param in CanonicalParameter::ALL {
            assert_eq!(normalize(param.key()), param.key(), "key {}", param.key());
        }
    }

    #[test]
    fn test_display_names_resolve_to_their_parameter() {
        for param in CanonicalParameter::ALL {
            assert_eq!(
                normalize(param.display_name()),
                param.key(),
                "label {}",
                param.display_name()
            );
        }
    }

    #[test]
    fn test_red_cell_indices_precede_hemoglobin() {
        assert_eq!(
            normalize("Mean Corpuscular Hemoglobin Concentration"),
            "mchc_g_dL"
        );
        assert_eq!(normalize("Mean Corpuscular Haemoglobin"), "mch_pg");
        assert_eq!(normalize("Glycated Hemoglobin"), "hba1c_percent");
        assert_eq!(normalize("Haemoglobin (Hb)"), "hemoglobin_g_dL");
        assert_eq!(normalize("HB"), "hemoglobin_g_dL");
    }

    #[test]
    fn test_common_report_labels() {
        assert_eq!(normalize("White Blood Cell Count (WBC)"), "wbc_10e9_L");
        assert_eq!(normalize("Platelet Count"), "platelet_count");
        assert_eq!(normalize("Red Cell Distribution Width"), "rdw_percent");
        assert_eq!(normalize("Erythrocyte Sedimentation Rate"), "esr_mm_hr");
        assert_eq!(normalize("Total RBC count"), "rbc_count");
        assert_eq!(normalize("Packed Cell Volume"), "hematocrit_percent");
        assert_eq!(normalize("C-Reactive Protein"), "crp_mg_L");
        assert_eq!(normalize("Total Iron Binding Capacity"), "tibc_mcg_dL");
        assert_eq!(normalize("Iron"), "serum_iron_mcg_dL");
    }

    #[test]
    fn test_parenthetical_content_is_ignored() {
        // "(WBC)" inside parentheses must not drive the match.
        assert_eq!(normalize("Platelets (WBC adjacent)"), "platelet_count");
    }

    #[test]
    fn test_unknown_label_falls_back_to_loaded_key() {
        let loaded = ["uric_acid"];
        assert_eq!(
            normalize_parameter_name("Serum Uric Acid", loaded),
            "uric_acid"
        );
    }

    #[test]
    fn test_unknown_label_falls_back_to_snake_case() {
        assert_eq!(normalize("Serum Uric Acid"), "serum_uric_acid");
        assert_eq!(normalize("  Lipase -- total "), "lipase_total");
    }

    #[test]
    fn test_empty_input_yields_empty_key() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("()"), "");
    }

    #[test]
    fn test_from_key_roundtrip() {
        for param in CanonicalParameter::ALL {
            assert_eq!(CanonicalParameter::from_key(param.key()), Some(param));
        }
        assert_eq!(CanonicalParameter::from_key("hemoglobin"), None);
    }
}
