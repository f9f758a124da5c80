//! JSON template catalog.
//!
//! Layout: `{ canonical_key: { status_label: TemplateBlock } }`. The catalog
//! shipped with the crate is embedded at compile time; a file can replace it.

use std::collections::HashMap;
use std::path::Path;

use crate::ports::{TemplateBlock, TemplateCatalog};

const EMBEDDED_TEMPLATES: &str = include_str!("../../../data/templates.json");

/// Error type for catalog loading.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("Failed to read template file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed template JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// In-memory template catalog.
#[derive(Debug, Clone, Default)]
pub struct JsonTemplateCatalog {
    templates: HashMap<String, HashMap<String, TemplateBlock>>,
}

impl JsonTemplateCatalog {
    /// Catalog compiled into the binary.
    ///
    /// # Errors
    /// Returns error if the embedded JSON is malformed.
    pub fn embedded() -> Result<Self, TemplateError> {
        Self::from_json_str(EMBEDDED_TEMPLATES)
    }

    /// # Errors
    /// Returns error if the text is not a valid catalog.
    pub fn from_json_str(json: &str) -> Result<Self, TemplateError> {
        let templates = serde_json::from_str(json)?;
        Ok(Self { templates })
    }

    /// # Errors
    /// Returns error if the file cannot be read or parsed.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, TemplateError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Number of parameters with at least one template.
    #[must_use]
    pub fn parameter_count(&self) -> usize {
        self.templates.len()
    }
}

impl TemplateCatalog for JsonTemplateCatalog {
    fn lookup(&self, parameter: &str, status_label: &str) -> Option<TemplateBlock> {
        self.templates.get(parameter)?.get(status_label).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CanonicalParameter;

    #[test]
    fn test_embedded_catalog_covers_every_parameter() {
        let catalog = JsonTemplateCatalog::embedded().expect("embedded catalog");
        assert_eq!(catalog.parameter_count(), CanonicalParameter::ALL.len());
        for param in CanonicalParameter::ALL {
            let has_baseline = catalog.lookup(param.key(), "Normal").is_some()
                || catalog.lookup(param.key(), "Sufficient").is_some();
            assert!(has_baseline, "{} has no baseline template", param.key());
        }
    }

    #[test]
    fn test_lookup_is_exact() {
        let catalog = JsonTemplateCatalog::embedded().expect("embedded catalog");
        let block = catalog.lookup("hemoglobin_g_dL", "Low").expect("template");
        assert!(block.intro.contains("anemia"));
        assert!(block.abnormal_primary.is_some());
        assert!(catalog.lookup("hemoglobin_g_dL", "Critical Low").is_none());
        assert!(catalog.lookup("unknown_marker", "Low").is_none());
    }

    #[test]
    fn test_file_override() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("templates.json");
        std::fs::write(
            &path,
            r#"{ "wbc_10e9_L": { "High": { "intro": "Raised white cells." } } }"#,
        )
        .expect("write");
        let catalog = JsonTemplateCatalog::from_path(&path).expect("catalog");
        let block = catalog.lookup("wbc_10e9_L", "High").expect("template");
        assert_eq!(block.intro, "Raised white cells.");
        assert!(block.recommendations.is_empty());
        assert!(JsonTemplateCatalog::from_json_str("[1, 2]").is_err());
    }
}
