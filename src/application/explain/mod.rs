//! Explainability reconciler.
//!
//! Runs attribution strategies in a fixed priority order and keeps the first
//! one that yields a well-shaped, non-degenerate result:
//!
//! 1. [`AttributionMethod::TreeShap`]: exact TreeSHAP, tree ensembles with a
//!    scalar baseline only
//! 2. [`AttributionMethod::TreeContributions`]: decision-path contributions
//! 3. [`AttributionMethod::Perturbation`]: zero-out probability deltas
//! 4. [`AttributionMethod::GlobalImportance`]: static importances, unsigned
//! 5. [`AttributionMethod::BlackBox`]: sampled Shapley values over
//!    `predict_proba`, non-tree models only
//!
//! Failure of every strategy is not an error for the caller: the result
//! carries no entries and a diagnostic string.

mod strategies;
mod tree_shap;

pub use strategies::{black_box_shapley, perturbation};
pub use tree_shap::{tree_shap, TreeShapValues};

use ndarray::{ArrayD, Axis, Ix1, Ix2, Ix3};

use crate::domain::{rank_attributions, AttributionEntry, AttributionMethod};
use crate::ports::{ClassifierError, ModelArtifact};

/// Default number of sampled permutations for black-box attribution.
pub const DEFAULT_BLACKBOX_PERMUTATIONS: usize = 32;
/// Default seed for black-box attribution sampling.
pub const DEFAULT_BLACKBOX_SEED: u64 = 42;

/// Strategy order, highest priority first.
pub const STRATEGY_ORDER: [AttributionMethod; 5] = [
    AttributionMethod::TreeShap,
    AttributionMethod::TreeContributions,
    AttributionMethod::Perturbation,
    AttributionMethod::GlobalImportance,
    AttributionMethod::BlackBox,
];

/// Why one attribution strategy produced nothing usable.
#[derive(Debug, thiserror::Error)]
pub enum ExplainError {
    #[error("{method} not applicable: {reason}")]
    NotApplicable {
        method: AttributionMethod,
        reason: String,
    },

    #[error("attribution shape {shape:?} does not match {n_features} features")]
    Shape { shape: Vec<usize>, n_features: usize },

    #[error("predicted class {class} is outside the attribution's {n_classes} classes")]
    ClassOutOfRange { class: usize, n_classes: usize },

    #[error("{0} produced non-finite values")]
    Numerical(AttributionMethod),

    #[error("{0} produced no attribution above its threshold")]
    Degenerate(AttributionMethod),

    #[error(transparent)]
    Classifier(#[from] ClassifierError),
}

/// Reduce a raw attribution array to one value per feature for `class`.
///
/// - 1-D: used as is
/// - 2-D: `(1, n)` takes row 0; `(n, k)` takes column `class`
/// - 3-D: `(1, k, n)` takes `[0, class, :]`; `(1, n, k)` takes `[0, :, class]`
///
/// Any other shape is an error; the layout is never guessed.
///
/// # Errors
/// Returns [`ExplainError::Shape`] or [`ExplainError::ClassOutOfRange`].
pub fn normalize_attribution(
    raw: ArrayD<f64>,
    n_features: usize,
    class: usize,
) -> Result<Vec<f64>, ExplainError> {
    let shape = raw.shape().to_vec();
    let shape_err = || ExplainError::Shape {
        shape: shape.clone(),
        n_features,
    };
    let class_err = |n_classes: usize| ExplainError::ClassOutOfRange { class, n_classes };

    match raw.ndim() {
        1 => {
            let v = raw.into_dimensionality::<Ix1>().map_err(|_| shape_err())?;
            if v.len() != n_features {
                return Err(shape_err());
            }
            Ok(v.to_vec())
        }
        2 => {
            let m = raw.into_dimensionality::<Ix2>().map_err(|_| shape_err())?;
            let (rows, cols) = m.dim();
            if cols == n_features && rows >= 1 {
                Ok(m.row(0).to_vec())
            } else if rows == n_features {
                if class >= cols {
                    return Err(class_err(cols));
                }
                Ok(m.column(class).to_vec())
            } else {
                Err(shape_err())
            }
        }
        3 => {
            let t = raw.into_dimensionality::<Ix3>().map_err(|_| shape_err())?;
            let (samples, mid, last) = t.dim();
            if samples == 0 {
                return Err(shape_err());
            }
            let sample = t.index_axis(Axis(0), 0);
            if last == n_features {
                if class >= mid {
                    return Err(class_err(mid));
                }
                Ok(sample.row(class).to_vec())
            } else if mid == n_features {
                if class >= last {
                    return Err(class_err(last));
                }
                Ok(sample.column(class).to_vec())
            } else {
                Err(shape_err())
            }
        }
        _ => Err(shape_err()),
    }
}

/// Outcome of reconciliation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Explanation {
    /// Ranked, filtered entries from the winning strategy
    pub entries: Vec<AttributionEntry>,
    /// Unfiltered per-feature values from the winning strategy
    pub values: Option<Vec<f64>>,
    pub method: Option<AttributionMethod>,
    /// Set when no strategy succeeded
    pub error: Option<String>,
}

impl Explanation {
    /// Empty explanation with a diagnostic.
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// Tries attribution strategies in priority order.
#[derive(Debug, Clone)]
pub struct ExplainabilityReconciler {
    blackbox_permutations: usize,
    blackbox_seed: u64,
}

impl Default for ExplainabilityReconciler {
    fn default() -> Self {
        Self::new(DEFAULT_BLACKBOX_PERMUTATIONS, DEFAULT_BLACKBOX_SEED)
    }
}

impl ExplainabilityReconciler {
    #[must_use]
    pub fn new(blackbox_permutations: usize, blackbox_seed: u64) -> Self {
        Self {
            blackbox_permutations: blackbox_permutations.max(1),
            blackbox_seed,
        }
    }

    /// Raw attribution array for one strategy.
    fn attempt(
        &self,
        method: AttributionMethod,
        artifact: &ModelArtifact,
        x: &[f64],
        class: usize,
    ) -> Result<ArrayD<f64>, ExplainError> {
        let classifier = artifact.classifier.as_ref();
        let not_applicable = |reason: &str| ExplainError::NotApplicable {
            method,
            reason: reason.to_string(),
        };
        match method {
            AttributionMethod::TreeShap => {
                let ensemble = classifier
                    .as_tree_ensemble()
                    .ok_or_else(|| not_applicable("model is not a tree ensemble"))?;
                Ok(tree_shap(ensemble, x)?.values)
            }
            AttributionMethod::TreeContributions => {
                let ensemble = classifier
                    .as_tree_ensemble()
                    .ok_or_else(|| not_applicable("model is not a tree ensemble"))?;
                let contributions = ensemble.predict_contributions(x)?;
                let n = ensemble.n_features();
                // Trailing column is the bias term.
                Ok(contributions
                    .slice(ndarray::s![.., .., ..n])
                    .to_owned()
                    .into_dyn())
            }
            AttributionMethod::Perturbation => Ok(perturbation(classifier, x, class)?.into_dyn()),
            AttributionMethod::GlobalImportance => artifact
                .global_importances()
                .map(|v| ndarray::Array1::from(v).into_dyn())
                .ok_or_else(|| not_applicable("model exposes no importances")),
            AttributionMethod::BlackBox => {
                if classifier.as_tree_ensemble().is_some() {
                    return Err(not_applicable("reserved for non-tree models"));
                }
                Ok(black_box_shapley(
                    classifier,
                    x,
                    class,
                    self.blackbox_permutations,
                    self.blackbox_seed,
                )?
                .into_dyn())
            }
        }
    }

    /// Explain the prediction of `artifact` for `x` at mapped class `class`.
    ///
    /// `names` is the model's input ordering and must match `x`.
    #[must_use]
    pub fn explain(
        &self,
        artifact: &ModelArtifact,
        x: &[f64],
        names: &[String],
        class: usize,
    ) -> Explanation {
        let mut failures = Vec::new();
        for method in STRATEGY_ORDER {
            let outcome = self
                .attempt(method, artifact, x, class)
                .and_then(|raw| normalize_attribution(raw, names.len(), class))
                .and_then(|values| {
                    if values.iter().any(|v| !v.is_finite()) {
                        return Err(ExplainError::Numerical(method));
                    }
                    let entries = rank_attributions(names, &values, method);
                    if entries.is_empty() {
                        return Err(ExplainError::Degenerate(method));
                    }
                    Ok((values, entries))
                });

            match outcome {
                Ok((values, entries)) => {
                    tracing::debug!(
                        method = %method,
                        entries = entries.len(),
                        skipped = failures.len(),
                        "Attribution strategy succeeded"
                    );
                    return Explanation {
                        entries,
                        values: Some(values),
                        method: Some(method),
                        error: None,
                    };
                }
                Err(e) => {
                    tracing::debug!(method = %method, error = %e, "Attribution strategy skipped");
                    failures.push(e.to_string());
                }
            }
        }

        let error = format!("All attribution strategies failed: {}", failures.join("; "));
        tracing::warn!(parameter = %artifact.parameter, "{error}");
        Explanation::failed(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::models::{LogisticModel, TreeEnsembleModel};
    use crate::domain::Direction;
    use crate::ports::{BaseScore, ClassMapping, Classifier, DecisionTree, TreeNode};
    use ndarray::{Array, Array1, Array2, Array3};

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("f{i}")).collect()
    }

    fn artifact(classifier: Box<dyn Classifier>, importances: Option<Vec<f64>>) -> ModelArtifact {
        let n_classes = classifier.n_classes();
        ModelArtifact {
            parameter: "wbc_10e9_L".into(),
            feature_names: None,
            class_mapping: ClassMapping::identity(n_classes).expect("mapping"),
            importances,
            classifier,
        }
    }

    fn stump(class: usize, feature: usize, lo: f64, hi: f64) -> DecisionTree {
        DecisionTree::new(
            class,
            vec![
                TreeNode::Split {
                    feature,
                    threshold: 1.0,
                    left: 1,
                    right: 2,
                    cover: None,
                },
                TreeNode::Leaf {
                    value: lo,
                    cover: Some(4.0),
                },
                TreeNode::Leaf {
                    value: hi,
                    cover: Some(4.0),
                },
            ],
        )
        .expect("stump")
    }

    fn booster(base: BaseScore) -> TreeEnsembleModel {
        TreeEnsembleModel::gradient_boosting(
            3,
            4,
            base,
            vec![
                stump(0, 0, -1.0, 1.0),
                stump(1, 1, 1.0, -1.0),
                stump(2, 2, -0.5, 0.5),
            ],
        )
        .expect("booster")
    }

    #[test]
    fn test_normalize_3d_last_axis() {
        let raw = Array::from_shape_fn((1, 3, 40), |(_, c, f)| (c * 100 + f) as f64);
        let expected: Vec<f64> = (0..40).map(|f| (100 + f) as f64).collect();
        let values = normalize_attribution(raw.into_dyn(), 40, 1).expect("slice");
        assert_eq!(values.len(), 40);
        assert_eq!(values, expected);
    }

    #[test]
    fn test_normalize_3d_middle_axis() {
        let raw = Array::from_shape_fn((1, 40, 3), |(_, f, c)| (c * 100 + f) as f64);
        let values = normalize_attribution(raw.into_dyn(), 40, 2).expect("slice");
        assert_eq!(values[5], 205.0);
    }

    #[test]
    fn test_normalize_1d_and_2d() {
        let one = Array1::from(vec![0.1, 0.2, 0.3]).into_dyn();
        assert_eq!(normalize_attribution(one, 3, 0).expect("1-D"), vec![0.1, 0.2, 0.3]);

        let row = Array2::from_shape_vec((1, 3), vec![1.0, 2.0, 3.0]).expect("shape").into_dyn();
        assert_eq!(normalize_attribution(row, 3, 2).expect("row"), vec![1.0, 2.0, 3.0]);

        let per_class = Array2::from_shape_fn((3, 2), |(f, c)| (f * 10 + c) as f64).into_dyn();
        assert_eq!(normalize_attribution(per_class, 3, 1).expect("column"), vec![1.0, 11.0, 21.0]);
    }

    #[test]
    fn test_normalize_rejects_unknown_layouts() {
        let raw = Array3::<f64>::zeros((1, 5, 6)).into_dyn();
        assert!(matches!(
            normalize_attribution(raw, 40, 0),
            Err(ExplainError::Shape { .. })
        ));
        let raw = Array3::<f64>::zeros((1, 2, 40)).into_dyn();
        assert!(matches!(
            normalize_attribution(raw, 40, 3),
            Err(ExplainError::ClassOutOfRange { class: 3, n_classes: 2 })
        ));
        let raw = Array1::<f64>::zeros(4).into_dyn();
        assert!(normalize_attribution(raw, 40, 0).is_err());
    }

    #[test]
    fn test_tree_shap_wins_for_scalar_base_score() {
        let artifact = artifact(Box::new(booster(BaseScore::Scalar(0.5))), None);
        let explanation = ExplainabilityReconciler::default().explain(&artifact, &[2.0, 0.0, 0.0, 0.0], &names(4), 0);
        assert_eq!(explanation.method, Some(AttributionMethod::TreeShap));
        assert!(explanation.error.is_none());
        assert_eq!(explanation.entries[0].feature, "f0");
        assert_eq!(explanation.entries[0].direction, Direction::Increases);
        assert!(explanation.entries.len() <= 5);
    }

    #[test]
    fn test_tree_shap_square_ensemble_reads_predicted_class() {
        // As many features as classes; each class tree reads a different feature.
        let model = TreeEnsembleModel::gradient_boosting(
            3,
            3,
            BaseScore::Scalar(0.5),
            vec![
                stump(0, 1, -1.0, 1.0),
                stump(1, 2, 0.5, -2.0),
                stump(2, 0, -0.25, 3.0),
            ],
        )
        .expect("booster");
        let artifact = artifact(Box::new(model), None);
        let reconciler = ExplainabilityReconciler::default();
        let x = [2.0, 2.0, 2.0];

        let class0 = reconciler.explain(&artifact, &x, &names(3), 0);
        assert_eq!(class0.method, Some(AttributionMethod::TreeShap));
        assert_eq!(class0.entries.len(), 1);
        assert_eq!(class0.entries[0].feature, "f1");
        let values = class0.values.expect("values");
        assert!((values[1] - 1.0).abs() < 1e-12);
        assert_eq!(values[0], 0.0);
        assert_eq!(values[2], 0.0);

        let class1 = reconciler.explain(&artifact, &x, &names(3), 1);
        assert_eq!(class1.entries[0].feature, "f2");
        assert_eq!(class1.entries[0].direction, Direction::Decreases);

        let class2 = reconciler.explain(&artifact, &x, &names(3), 2);
        assert_eq!(class2.entries[0].feature, "f0");
        assert_eq!(class2.entries[0].direction, Direction::Increases);
    }

    #[test]
    fn test_array_base_score_skips_to_contributions() {
        let artifact = artifact(
            Box::new(booster(BaseScore::PerClassArray(vec![0.3, 0.3, 0.3]))),
            None,
        );
        let explanation = ExplainabilityReconciler::default().explain(&artifact, &[0.0, 0.0, 0.0, 0.0], &names(4), 1);
        assert_eq!(explanation.method, Some(AttributionMethod::TreeContributions));
        let values = explanation.values.expect("values");
        assert_eq!(values.len(), 4);
        assert!((values[1] - 1.0).abs() < 1e-12);
        assert_eq!(explanation.entries[0].feature, "f1");
    }

    #[test]
    fn test_logistic_uses_perturbation() {
        let model = LogisticModel::new(vec![vec![0.0, 0.0], vec![2.0, -1.0]], vec![0.0, 0.0]).expect("model");
        let artifact = artifact(Box::new(model), None);
        let explanation = ExplainabilityReconciler::default().explain(&artifact, &[1.0, 1.0], &names(2), 1);
        assert_eq!(explanation.method, Some(AttributionMethod::Perturbation));
        let f0 = explanation.entries.iter().find(|e| e.feature == "f0").expect("f0");
        let f1 = explanation.entries.iter().find(|e| e.feature == "f1").expect("f1");
        assert_eq!(f0.direction, Direction::Increases);
        assert_eq!(f1.direction, Direction::Decreases);
    }

    #[test]
    fn test_all_zero_attributions_yield_error() {
        // Constant model: every strategy sees zeros.
        let model = LogisticModel::new(vec![vec![0.0, 0.0], vec![0.0, 0.0]], vec![0.0, 0.0]).expect("model");
        let artifact = artifact(Box::new(model), Some(vec![0.0, 0.0]));
        let explanation = ExplainabilityReconciler::default().explain(&artifact, &[3.0, 4.0], &names(2), 0);
        assert!(explanation.entries.is_empty());
        assert!(explanation.values.is_none());
        let error = explanation.error.expect("error");
        assert!(error.contains("perturbation"));
        assert!(error.contains("black_box"));
    }

    #[test]
    fn test_global_importance_is_unsigned() {
        let model = LogisticModel::new(vec![vec![0.0, 0.0], vec![0.0, 0.0]], vec![0.0, 0.0]).expect("model");
        let artifact = artifact(Box::new(model), Some(vec![0.7, 0.3]));
        let explanation = ExplainabilityReconciler::default().explain(&artifact, &[3.0, 4.0], &names(2), 0);
        assert_eq!(explanation.method, Some(AttributionMethod::GlobalImportance));
        assert!(explanation
            .entries
            .iter()
            .all(|e| e.direction == Direction::Importance && e.impact > 0.0));
    }
}
