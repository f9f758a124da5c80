//! Serialized model artifacts.
//!
//! One JSON document per canonical parameter:
//!
//! ```json
//! {
//!   "format_version": 1,
//!   "parameter": "wbc_10e9_L",
//!   "feature_names": ["patientAge", "..."],
//!   "original_classes": [0, 1, 2],
//!   "feature_importances": [0.1, "..."],
//!   "model": { "kind": "gradient_boosting", "num_class": 3, "base_score": "5E-1", "trees": [] }
//! }
//! ```
//!
//! `base_score` is kept as the trainer wrote it. A bracketed array string
//! (`"[3.3E-1,3.3E-1,3.3E-1]"`) still predicts correctly but marks the
//! ensemble as unsuitable for exact tree attribution.

mod logistic;
mod trees;

pub use logistic::LogisticModel;
pub use trees::TreeEnsembleModel;

use serde::Deserialize;

use crate::domain::schema_feature_names;
use crate::ports::{BaseScore, ClassMapping, Classifier, ClassifierError, DecisionTree, ModelArtifact, TreeNode};

/// Newest artifact format this build understands.
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

/// Errors decoding an artifact document.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("Malformed artifact JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported artifact format version {0}")]
    UnsupportedVersion(u32),

    #[error("Artifact is for '{found}', expected '{expected}'")]
    ParameterMismatch { expected: String, found: String },

    #[error("Invalid base_score '{0}'")]
    BaseScore(String),

    #[error("Invalid artifact: {0}")]
    Invalid(String),

    #[error(transparent)]
    Classifier(#[from] ClassifierError),
}

#[derive(Debug, Deserialize)]
struct ArtifactDocument {
    format_version: u32,
    parameter: String,
    #[serde(default)]
    feature_names: Option<Vec<String>>,
    #[serde(default)]
    original_classes: Option<Vec<u8>>,
    #[serde(default)]
    feature_importances: Option<Vec<f64>>,
    model: ModelDocument,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum ModelDocument {
    GradientBoosting {
        num_class: usize,
        base_score: String,
        trees: Vec<TreeDocument>,
    },
    RandomForest {
        num_class: usize,
        trees: Vec<TreeDocument>,
    },
    Logistic {
        coefficients: Vec<Vec<f64>>,
        intercepts: Vec<f64>,
    },
}

#[derive(Debug, Deserialize)]
struct TreeDocument {
    class_index: usize,
    nodes: Vec<NodeDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NodeDocument {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
        #[serde(default)]
        cover: Option<f64>,
    },
    Leaf {
        leaf: f64,
        #[serde(default)]
        cover: Option<f64>,
    },
}

impl From<NodeDocument> for TreeNode {
    fn from(node: NodeDocument) -> Self {
        match node {
            NodeDocument::Split {
                feature,
                threshold,
                left,
                right,
                cover,
            } => Self::Split {
                feature,
                threshold,
                left,
                right,
                cover,
            },
            NodeDocument::Leaf { leaf, cover } => Self::Leaf { value: leaf, cover },
        }
    }
}

/// Parse a serialized `base_score`.
///
/// # Errors
/// Returns [`ArtifactError::BaseScore`] if the text is neither a float nor a
/// bracketed list of floats.
pub fn parse_base_score(raw: &str) -> Result<BaseScore, ArtifactError> {
    let text = raw.trim();
    let invalid = || ArtifactError::BaseScore(raw.to_string());
    if let Some(inner) = text.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
        let values = inner
            .split(',')
            .map(|v| v.trim().parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| invalid())?;
        if values.is_empty() || values.iter().any(|v| !v.is_finite()) {
            return Err(invalid());
        }
        return Ok(BaseScore::PerClassArray(values));
    }
    match text.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(BaseScore::Scalar(v)),
        _ => Err(invalid()),
    }
}

fn build_trees(docs: Vec<TreeDocument>) -> Result<Vec<DecisionTree>, ClassifierError> {
    docs.into_iter()
        .map(|t| DecisionTree::new(t.class_index, t.nodes.into_iter().map(TreeNode::from).collect()))
        .collect()
}

/// Decode and validate an artifact for `expected_key`.
///
/// # Errors
/// Returns [`ArtifactError`] for malformed JSON, an unknown format version,
/// a parameter mismatch, or any structural inconsistency.
pub fn parse_artifact(json: &[u8], expected_key: &str) -> Result<ModelArtifact, ArtifactError> {
    let doc: ArtifactDocument = serde_json::from_slice(json)?;

    if doc.format_version == 0 || doc.format_version > ARTIFACT_FORMAT_VERSION {
        return Err(ArtifactError::UnsupportedVersion(doc.format_version));
    }
    if doc.parameter != expected_key {
        return Err(ArtifactError::ParameterMismatch {
            expected: expected_key.to_string(),
            found: doc.parameter,
        });
    }

    let schema_width = doc
        .feature_names
        .as_ref()
        .map_or_else(|| schema_feature_names().len(), Vec::len);

    let classifier: Box<dyn Classifier> = match doc.model {
        ModelDocument::GradientBoosting {
            num_class,
            base_score,
            trees,
        } => Box::new(TreeEnsembleModel::gradient_boosting(
            num_class,
            schema_width,
            parse_base_score(&base_score)?,
            build_trees(trees)?,
        )?),
        ModelDocument::RandomForest { num_class, trees } => Box::new(TreeEnsembleModel::random_forest(
            num_class,
            schema_width,
            build_trees(trees)?,
        )?),
        ModelDocument::Logistic {
            coefficients,
            intercepts,
        } => Box::new(LogisticModel::new(coefficients, intercepts)?),
    };

    if classifier.n_features() != schema_width {
        return Err(ArtifactError::Invalid(format!(
            "model reads {} features but the schema has {schema_width}",
            classifier.n_features()
        )));
    }

    let class_mapping = match &doc.original_classes {
        Some(classes) => ClassMapping::from_original_classes(classes)?,
        None => ClassMapping::identity(classifier.n_classes())?,
    };
    if class_mapping.len() != classifier.n_classes() {
        return Err(ArtifactError::Invalid(format!(
            "{} original classes for a {}-class model",
            class_mapping.len(),
            classifier.n_classes()
        )));
    }

    if let Some(importances) = &doc.feature_importances {
        if importances.len() != schema_width {
            return Err(ArtifactError::Invalid(format!(
                "{} feature importances for {schema_width} features",
                importances.len()
            )));
        }
    }

    Ok(ModelArtifact {
        parameter: doc.parameter,
        feature_names: doc.feature_names,
        class_mapping,
        importances: doc.feature_importances,
        classifier,
    })
}
