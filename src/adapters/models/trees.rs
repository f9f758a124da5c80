//! Tree-ensemble classifiers: gradient boosting and random forest.

use crate::ports::{
    Aggregation, BaseScore, Classifier, ClassifierError, DecisionTree, TreeEnsemble, TreeNode,
};

/// Tree ensemble evaluated either as boosted margins or as an averaged forest.
#[derive(Debug, Clone)]
pub struct TreeEnsembleModel {
    aggregation: Aggregation,
    num_class: usize,
    n_features: usize,
    base_score: BaseScore,
    trees: Vec<DecisionTree>,
}

impl TreeEnsembleModel {
    /// Boosted ensemble; probabilities are the softmax of per-class margins.
    ///
    /// # Errors
    /// Returns error if the trees do not fit `num_class` and `n_features`.
    pub fn gradient_boosting(
        num_class: usize,
        n_features: usize,
        base_score: BaseScore,
        trees: Vec<DecisionTree>,
    ) -> Result<Self, ClassifierError> {
        if let BaseScore::PerClassArray(values) = &base_score {
            if values.len() != num_class {
                return Err(ClassifierError::InvalidModel(format!(
                    "base_score has {} entries for {num_class} classes",
                    values.len()
                )));
            }
        }
        Self::build(Aggregation::Sum, num_class, n_features, base_score, trees)
    }

    /// Bagged ensemble; leaves hold per-class scores that are averaged and
    /// normalised.
    ///
    /// # Errors
    /// Returns error if the trees do not fit `num_class` and `n_features`.
    pub fn random_forest(
        num_class: usize,
        n_features: usize,
        trees: Vec<DecisionTree>,
    ) -> Result<Self, ClassifierError> {
        Self::build(Aggregation::Mean, num_class, n_features, BaseScore::Scalar(0.0), trees)
    }

    fn build(
        aggregation: Aggregation,
        num_class: usize,
        n_features: usize,
        base_score: BaseScore,
        trees: Vec<DecisionTree>,
    ) -> Result<Self, ClassifierError> {
        if num_class < 2 {
            return Err(ClassifierError::InvalidModel(format!(
                "need at least 2 classes, got {num_class}"
            )));
        }
        for (i, tree) in trees.iter().enumerate() {
            if tree.class_index() >= num_class {
                return Err(ClassifierError::InvalidModel(format!(
                    "tree {i} targets class {} of {num_class}",
                    tree.class_index()
                )));
            }
            if let Some(feature) = tree.max_feature() {
                if feature >= n_features {
                    return Err(ClassifierError::InvalidModel(format!(
                        "tree {i} reads feature {feature} of {n_features}"
                    )));
                }
            }
        }
        for class in 0..num_class {
            if !trees.iter().any(|t| t.class_index() == class) {
                return Err(ClassifierError::InvalidModel(format!("class {class} has no trees")));
            }
        }
        Ok(Self {
            aggregation,
            num_class,
            n_features,
            base_score,
            trees,
        })
    }

    fn class_outputs(&self, x: &[f64]) -> Vec<f64> {
        let mut out = vec![0.0; self.num_class];
        let mut counts = vec![0usize; self.num_class];
        for tree in &self.trees {
            out[tree.class_index()] += tree.predict(x);
            counts[tree.class_index()] += 1;
        }
        match self.aggregation {
            Aggregation::Sum => {
                for (class, v) in out.iter_mut().enumerate() {
                    *v += self.base_score.margin(class);
                }
            }
            Aggregation::Mean => {
                for (v, n) in out.iter_mut().zip(&counts) {
                    *v /= (*n).max(1) as f64;
                }
            }
        }
        out
    }
}

/// Numerically stable softmax.
pub(crate) fn softmax(margins: &[f64]) -> Vec<f64> {
    let max = margins.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = margins.iter().map(|m| (m - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

impl Classifier for TreeEnsembleModel {
    fn kind(&self) -> &'static str {
        match self.aggregation {
            Aggregation::Sum => "gradient_boosting",
            Aggregation::Mean => "random_forest",
        }
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn n_classes(&self) -> usize {
        self.num_class
    }

    fn predict_proba(&self, x: &[f64]) -> Result<Vec<f64>, ClassifierError> {
        if x.len() != self.n_features {
            return Err(ClassifierError::InputWidth {
                expected: self.n_features,
                got: x.len(),
            });
        }
        let outputs = self.class_outputs(x);
        let proba = match self.aggregation {
            Aggregation::Sum => softmax(&outputs),
            Aggregation::Mean => {
                let clipped: Vec<f64> = outputs.iter().map(|v| v.max(0.0)).collect();
                let sum: f64 = clipped.iter().sum();
                if sum <= 0.0 {
                    return Err(ClassifierError::NoProbabilities(
                        "all forest class scores are zero".into(),
                    ));
                }
                clipped.into_iter().map(|v| v / sum).collect()
            }
        };
        if proba.iter().any(|p| !p.is_finite()) {
            return Err(ClassifierError::NoProbabilities("non-finite probability".into()));
        }
        Ok(proba)
    }

    fn as_tree_ensemble(&self) -> Option<&dyn TreeEnsemble> {
        Some(self)
    }

    /// Cover-weighted split frequency per feature, normalised to sum to one.
    fn feature_importances(&self) -> Option<Vec<f64>> {
        let mut importances = vec![0.0; self.n_features];
        for tree in &self.trees {
            for (idx, node) in tree.nodes().iter().enumerate() {
                if let TreeNode::Split { feature, .. } = node {
                    importances[*feature] += tree.cover(idx);
                }
            }
        }
        let total: f64 = importances.iter().sum();
        if total <= 0.0 {
            return None;
        }
        Some(importances.into_iter().map(|v| v / total).collect())
    }
}

impl TreeEnsemble for TreeEnsembleModel {
    fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    fn num_classes(&self) -> usize {
        self.num_class
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn aggregation(&self) -> Aggregation {
        self.aggregation
    }

    fn base_score(&self) -> &BaseScore {
        &self.base_score
    }
}
