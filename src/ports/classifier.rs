//! Classifier port: the trained-model collaborator.
//!
//! A [`ModelArtifact`] bundles a [`Classifier`] with the metadata needed to
//! feed it (feature ordering) and to read its output (class mapping).
//! Tree-based classifiers additionally expose their structure through
//! [`TreeEnsemble`] so attribution can walk the trees directly.

use ndarray::Array3;

use crate::domain::StatusCode;

/// Errors raised by a classifier or its metadata.
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("Expected {expected} features, got {got}")]
    InputWidth { expected: usize, got: usize },

    #[error("Invalid model structure: {0}")]
    InvalidModel(String),

    #[error("Invalid class mapping: {0}")]
    InvalidClassMapping(String),

    #[error("Class index {0} has no status code")]
    UnknownClass(usize),

    #[error("Model produced no usable probabilities: {0}")]
    NoProbabilities(String),
}

/// One node of a flattened decision tree.
#[derive(Debug, Clone, PartialEq)]
pub enum TreeNode {
    /// `x[feature] < threshold` goes left
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
        cover: Option<f64>,
    },
    Leaf {
        value: f64,
        cover: Option<f64>,
    },
}

/// Validated decision tree with resolved covers and node expectations.
#[derive(Debug, Clone)]
pub struct DecisionTree {
    class_index: usize,
    nodes: Vec<TreeNode>,
    covers: Vec<f64>,
    expected: Vec<f64>,
}

impl DecisionTree {
    /// Validate a flat node list.
    ///
    /// Node 0 is the root. Children must point strictly forward and stay in
    /// range. Missing covers default to 1 per leaf and the children's sum per
    /// split.
    ///
    /// # Errors
    /// Returns [`ClassifierError::InvalidModel`] on any structural defect.
    pub fn new(class_index: usize, nodes: Vec<TreeNode>) -> Result<Self, ClassifierError> {
        if nodes.is_empty() {
            return Err(ClassifierError::InvalidModel("tree has no nodes".into()));
        }
        let n = nodes.len();
        for (idx, node) in nodes.iter().enumerate() {
            match node {
                TreeNode::Split {
                    left, right, threshold, cover, ..
                } => {
                    for child in [*left, *right] {
                        if child <= idx || child >= n {
                            return Err(ClassifierError::InvalidModel(format!(
                                "node {idx} points to invalid child {child}"
                            )));
                        }
                    }
                    if !threshold.is_finite() {
                        return Err(ClassifierError::InvalidModel(format!(
                            "node {idx} has a non-finite threshold"
                        )));
                    }
                    if cover.is_some_and(|c| !(c.is_finite() && c > 0.0)) {
                        return Err(ClassifierError::InvalidModel(format!(
                            "split {idx} has a non-positive cover"
                        )));
                    }
                }
                TreeNode::Leaf { value, cover } => {
                    if !value.is_finite() {
                        return Err(ClassifierError::InvalidModel(format!(
                            "leaf {idx} has a non-finite value"
                        )));
                    }
                    if cover.is_some_and(|c| !(c.is_finite() && c >= 0.0)) {
                        return Err(ClassifierError::InvalidModel(format!(
                            "leaf {idx} has a negative cover"
                        )));
                    }
                }
            }
        }

        // Children always follow their parent, so a reverse sweep sees them first.
        let mut covers = vec![0.0; n];
        let mut expected = vec![0.0; n];
        for idx in (0..n).rev() {
            match &nodes[idx] {
                TreeNode::Leaf { value, cover } => {
                    covers[idx] = cover.unwrap_or(1.0);
                    expected[idx] = *value;
                }
                TreeNode::Split {
                    left, right, cover, ..
                } => {
                    let (cl, cr) = (covers[*left], covers[*right]);
                    let total = cl + cr;
                    if total <= 0.0 {
                        return Err(ClassifierError::InvalidModel(format!(
                            "split {idx} has children with zero cover"
                        )));
                    }
                    covers[idx] = cover.unwrap_or(total);
                    expected[idx] = (cl * expected[*left] + cr * expected[*right]) / total;
                }
            }
        }

        Ok(Self {
            class_index,
            nodes,
            covers,
            expected,
        })
    }

    #[must_use]
    pub fn class_index(&self) -> usize {
        self.class_index
    }

    #[must_use]
    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    #[must_use]
    pub fn cover(&self, node: usize) -> f64 {
        self.covers[node]
    }

    /// Cover-weighted mean output of the subtree rooted at `node`.
    #[must_use]
    pub fn node_expectation(&self, node: usize) -> f64 {
        self.expected[node]
    }

    /// Largest feature index any split reads.
    #[must_use]
    pub fn max_feature(&self) -> Option<usize> {
        self.nodes
            .iter()
            .filter_map(|n| match n {
                TreeNode::Split { feature, .. } => Some(*feature),
                TreeNode::Leaf { .. } => None,
            })
            .max()
    }

    /// Node indices visited for `x`, root to leaf.
    #[must_use]
    pub fn decision_path(&self, x: &[f64]) -> Vec<usize> {
        let mut path = vec![0];
        let mut idx = 0;
        while let TreeNode::Split {
            feature,
            threshold,
            left,
            right,
            ..
        } = &self.nodes[idx]
        {
            let v = x.get(*feature).copied().unwrap_or(0.0);
            idx = if v < *threshold { *left } else { *right };
            path.push(idx);
        }
        path
    }

    /// Leaf value for `x`.
    #[must_use]
    pub fn predict(&self, x: &[f64]) -> f64 {
        let path = self.decision_path(x);
        let leaf = path[path.len() - 1];
        self.expected[leaf]
    }
}

/// How per-class tree outputs combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    /// Boosting: margins add up
    Sum,
    /// Bagging: outputs are averaged
    Mean,
}

/// Ensemble baseline as serialized by the trainer.
#[derive(Debug, Clone, PartialEq)]
pub enum BaseScore {
    Scalar(f64),
    /// Per-class array encoded into the scalar field. Usable for prediction
    /// but not by exact tree attribution.
    PerClassArray(Vec<f64>),
}

impl BaseScore {
    /// Baseline margin for one class.
    #[must_use]
    pub fn margin(&self, class: usize) -> f64 {
        match self {
            Self::Scalar(v) => *v,
            Self::PerClassArray(values) => values.get(class).copied().unwrap_or(0.0),
        }
    }
}

/// Structural view of a tree-ensemble classifier.
pub trait TreeEnsemble: Send + Sync {
    fn trees(&self) -> &[DecisionTree];

    fn num_classes(&self) -> usize;

    fn n_features(&self) -> usize;

    fn aggregation(&self) -> Aggregation;

    fn base_score(&self) -> &BaseScore;

    /// Number of trees contributing to one class.
    fn trees_for_class(&self, class: usize) -> usize {
        self.trees().iter().filter(|t| t.class_index() == class).count()
    }

    /// Why exact tree attribution would be numerically wrong for this
    /// ensemble, if it would.
    fn tree_attribution_blocker(&self) -> Option<String> {
        match self.base_score() {
            BaseScore::Scalar(_) => None,
            BaseScore::PerClassArray(values) => Some(format!(
                "base_score is serialized as a {}-element array string",
                values.len()
            )),
        }
    }

    /// Decision-path contributions, shape `(1, n_classes, n_features + 1)`.
    ///
    /// Each split credits its feature with the change in subtree expectation
    /// along the path. The trailing column is the bias (baseline) term.
    ///
    /// # Errors
    /// Returns [`ClassifierError::InputWidth`] if `x` is the wrong length.
    fn predict_contributions(&self, x: &[f64]) -> Result<Array3<f64>, ClassifierError> {
        let n = self.n_features();
        if x.len() != n {
            return Err(ClassifierError::InputWidth {
                expected: n,
                got: x.len(),
            });
        }
        let k = self.num_classes();
        let mut out = Array3::<f64>::zeros((1, k, n + 1));
        for class in 0..k {
            let scale = match self.aggregation() {
                Aggregation::Sum => 1.0,
                Aggregation::Mean => 1.0 / self.trees_for_class(class).max(1) as f64,
            };
            if self.aggregation() == Aggregation::Sum {
                out[[0, class, n]] += self.base_score().margin(class);
            }
            for tree in self.trees().iter().filter(|t| t.class_index() == class) {
                let path = tree.decision_path(x);
                out[[0, class, n]] += scale * tree.node_expectation(0);
                for pair in path.windows(2) {
                    let (parent, child) = (pair[0], pair[1]);
                    if let TreeNode::Split { feature, .. } = &tree.nodes()[parent] {
                        let delta = tree.node_expectation(child) - tree.node_expectation(parent);
                        out[[0, class, *feature]] += scale * delta;
                    }
                }
            }
        }
        Ok(out)
    }
}

/// A trained classifier over a fixed-width numeric input.
pub trait Classifier: Send + Sync {
    /// Short model family name for logs.
    fn kind(&self) -> &'static str;

    fn n_features(&self) -> usize;

    fn n_classes(&self) -> usize;

    /// Class probabilities indexed by mapped (contiguous) class.
    ///
    /// # Errors
    /// Returns error if the input width is wrong or the output is unusable.
    fn predict_proba(&self, x: &[f64]) -> Result<Vec<f64>, ClassifierError>;

    /// Most probable mapped class.
    ///
    /// # Errors
    /// Propagates [`Classifier::predict_proba`] failures.
    fn predict(&self, x: &[f64]) -> Result<usize, ClassifierError> {
        let proba = self.predict_proba(x)?;
        argmax(&proba).ok_or_else(|| ClassifierError::NoProbabilities("empty probability vector".into()))
    }

    /// Tree structure, when the model is a tree ensemble.
    fn as_tree_ensemble(&self) -> Option<&dyn TreeEnsemble> {
        None
    }

    /// Static importances aligned with the input features.
    fn feature_importances(&self) -> Option<Vec<f64>> {
        None
    }
}

/// Index of the largest finite value. Ties resolve to the lowest index.
#[must_use]
pub fn argmax(values: &[f64]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .fold(None, |best: Option<(usize, f64)>, (i, &v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

/// Bidirectional map between a model's contiguous class indices and the
/// original status codes it was trained on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassMapping {
    original: Vec<StatusCode>,
}

impl ClassMapping {
    /// Build from the original label of each mapped index, e.g. `[0, 2, 3]`.
    ///
    /// # Errors
    /// Returns error if the list is empty, repeats a code, or holds a code
    /// outside 0..=3.
    pub fn from_original_classes(classes: &[u8]) -> Result<Self, ClassifierError> {
        if classes.is_empty() {
            return Err(ClassifierError::InvalidClassMapping("no classes".into()));
        }
        let mut original = Vec::with_capacity(classes.len());
        for &code in classes {
            let status =
                StatusCode::try_from(code).map_err(ClassifierError::InvalidClassMapping)?;
            if original.contains(&status) {
                return Err(ClassifierError::InvalidClassMapping(format!(
                    "status code {code} listed twice"
                )));
            }
            original.push(status);
        }
        Ok(Self { original })
    }

    /// Mapping where mapped index equals status code.
    ///
    /// # Errors
    /// Returns error if `n_classes` exceeds the number of status codes.
    pub fn identity(n_classes: usize) -> Result<Self, ClassifierError> {
        let codes: Vec<u8> = (0..n_classes)
            .map(|c| u8::try_from(c).unwrap_or(u8::MAX))
            .collect();
        Self::from_original_classes(&codes)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.original.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.original.is_empty()
    }

    /// Original status for a mapped class index.
    ///
    /// # Errors
    /// Returns [`ClassifierError::UnknownClass`] for an out-of-range index.
    pub fn to_original(&self, mapped: usize) -> Result<StatusCode, ClassifierError> {
        self.original
            .get(mapped)
            .copied()
            .ok_or(ClassifierError::UnknownClass(mapped))
    }

    /// Mapped class index for an original status.
    #[must_use]
    pub fn to_mapped(&self, status: StatusCode) -> Option<usize> {
        self.original.iter().position(|s| *s == status)
    }
}

/// A loaded model and its metadata. Immutable after load.
pub struct ModelArtifact {
    /// Canonical key this model classifies
    pub parameter: String,
    /// Input ordering; `None` means the full built schema in build order
    pub feature_names: Option<Vec<String>>,
    pub class_mapping: ClassMapping,
    /// Importances shipped with the artifact, overriding the model's own
    pub importances: Option<Vec<f64>>,
    pub classifier: Box<dyn Classifier>,
}

impl ModelArtifact {
    /// Importances from the artifact, else from the classifier.
    #[must_use]
    pub fn global_importances(&self) -> Option<Vec<f64>> {
        self.importances
            .clone()
            .or_else(|| self.classifier.feature_importances())
    }
}

impl std::fmt::Debug for ModelArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelArtifact")
            .field("parameter", &self.parameter)
            .field("kind", &self.classifier.kind())
            .field("n_features", &self.classifier.n_features())
            .field("class_mapping", &self.class_mapping)
            .finish_non_exhaustive()
    }
}
