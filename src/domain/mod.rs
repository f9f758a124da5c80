//! Domain layer: Core types and clinical rules.
//!
//! Pure Rust with no I/O. Everything here is deterministic and safe to call
//! from any thread.

mod attribution;
mod features;
mod interpretation;
mod parameter;
mod patient;
mod request;
mod risk;
mod status;
mod thresholds;

pub use attribution::{rank_attributions, AttributionEntry, AttributionMethod, Direction, MAX_ATTRIBUTIONS};
pub use features::{
    build_features, neutrophil_lymphocyte_ratio, schema_feature_names, FeatureVector, SchemaError, CO_PARAMETERS,
    FEATURE_SCHEMA_VERSION,
};
pub use interpretation::{round3, AbnormalFindings, Explainability, Interpretation, InterpretationResponse};
pub use parameter::{clean_parameter_label, match_canonical, normalize_parameter_name, CanonicalParameter};
pub use patient::{
    coerce_age, coerce_flag, coerce_number, Gender, PatientContext, Region, DEFAULT_AGE_YEARS,
    DEFAULT_WEIGHT_KG,
};
pub use request::{InterpretRequest, DEFAULT_PARAMETER, PARAMETER_ALIASES};
pub use risk::{
    assess_risks, AnemiaProfile, HealthScore, RiskAssessments, RiskFinding, RiskLevel, RiskPanel,
    ThrombosisRisk,
};
pub use status::{
    ClassificationResult, DecisionSource, StatusCode, Verdict, CLINICAL_RULE_CONFIDENCE,
    UNTABULATED_CONFIDENCE,
};
pub use thresholds::{classify_by_threshold, classify_parameter};
