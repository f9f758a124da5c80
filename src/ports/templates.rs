//! Template port: canned medical text per (parameter, status label).

use serde::{Deserialize, Serialize};

/// Prose blocks for one parameter and status.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TemplateBlock {
    #[serde(default)]
    pub intro: String,
    #[serde(default)]
    pub general: String,
    #[serde(default)]
    pub detailed: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub abnormal_primary: Option<String>,
    #[serde(default)]
    pub potential_causes: Vec<String>,
    #[serde(default)]
    pub disease_conditions: Vec<String>,
}

/// Lookup of canned text. A miss is not an error; the caller renders a
/// generic block instead.
pub trait TemplateCatalog: Send + Sync {
    fn lookup(&self, parameter: &str, status_label: &str) -> Option<TemplateBlock>;
}
