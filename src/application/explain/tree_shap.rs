//! Exact path-dependent TreeSHAP.
//!
//! Polynomial-time Shapley values for tree ensembles (Lundberg et al.,
//! "Consistent Individualized Feature Attribution for Tree Ensembles",
//! algorithm 2). Missing features follow each split in proportion to the
//! training cover of its children.

use ndarray::{Array3, ArrayD};

use crate::ports::{Aggregation, DecisionTree, TreeEnsemble, TreeNode};

use super::ExplainError;

#[derive(Debug, Clone, Copy)]
struct PathElement {
    feature: Option<usize>,
    zero_fraction: f64,
    one_fraction: f64,
    pweight: f64,
}

/// Shapley values and the per-class baseline they are relative to.
#[derive(Debug, Clone)]
pub struct TreeShapValues {
    /// Shape `(1, n_classes, n_features)`, the layout of `predict_contributions`
    pub values: ArrayD<f64>,
    /// Per-class expected margin
    pub expected_value: Vec<f64>,
}

fn extend_path(path: &mut Vec<PathElement>, zero_fraction: f64, one_fraction: f64, feature: Option<usize>) {
    let depth = path.len();
    path.push(PathElement {
        feature,
        zero_fraction,
        one_fraction,
        pweight: if depth == 0 { 1.0 } else { 0.0 },
    });
    let denom = (depth + 1) as f64;
    for i in (0..depth).rev() {
        path[i + 1].pweight += one_fraction * path[i].pweight * (i + 1) as f64 / denom;
        path[i].pweight = zero_fraction * path[i].pweight * (depth - i) as f64 / denom;
    }
}

/// Remove `path_index` from the path, undoing its weight contribution.
fn unwind_path(path: &mut Vec<PathElement>, path_index: usize) {
    let depth = path.len() - 1;
    let PathElement {
        zero_fraction,
        one_fraction,
        ..
    } = path[path_index];
    let denom = (depth + 1) as f64;
    let mut next_one_portion = path[depth].pweight;
    for i in (0..depth).rev() {
        if one_fraction != 0.0 {
            let tmp = path[i].pweight;
            path[i].pweight = next_one_portion * denom / ((i + 1) as f64 * one_fraction);
            next_one_portion = tmp - path[i].pweight * zero_fraction * (depth - i) as f64 / denom;
        } else {
            path[i].pweight = path[i].pweight * denom / (zero_fraction * (depth - i) as f64);
        }
    }
    for i in path_index..depth {
        path[i].feature = path[i + 1].feature;
        path[i].zero_fraction = path[i + 1].zero_fraction;
        path[i].one_fraction = path[i + 1].one_fraction;
    }
    path.pop();
}

/// Total permutation weight of the path with `path_index` removed.
fn unwound_path_sum(path: &[PathElement], path_index: usize) -> f64 {
    let depth = path.len() - 1;
    let PathElement {
        zero_fraction,
        one_fraction,
        ..
    } = path[path_index];
    let denom = (depth + 1) as f64;
    let mut next_one_portion = path[depth].pweight;
    let mut total = 0.0;
    for i in (0..depth).rev() {
        if one_fraction != 0.0 {
            let tmp = next_one_portion * denom / ((i + 1) as f64 * one_fraction);
            total += tmp;
            next_one_portion = path[i].pweight - tmp * zero_fraction * (depth - i) as f64 / denom;
        } else if zero_fraction != 0.0 {
            total += path[i].pweight / zero_fraction / ((depth - i) as f64 / denom);
        }
    }
    total
}

struct Walk<'a> {
    tree: &'a DecisionTree,
    x: &'a [f64],
    phi: &'a mut [f64],
    scale: f64,
}

impl Walk<'_> {
    fn recurse(
        &mut self,
        node: usize,
        parent_path: &[PathElement],
        zero_fraction: f64,
        one_fraction: f64,
        feature: Option<usize>,
    ) {
        let mut path = parent_path.to_vec();
        extend_path(&mut path, zero_fraction, one_fraction, feature);

        match &self.tree.nodes()[node] {
            TreeNode::Leaf { value, .. } => {
                for i in 1..path.len() {
                    let weight = unwound_path_sum(&path, i);
                    let el = path[i];
                    if let Some(f) = el.feature {
                        self.phi[f] += self.scale * weight * (el.one_fraction - el.zero_fraction) * value;
                    }
                }
            }
            TreeNode::Split {
                feature: split_feature,
                threshold,
                left,
                right,
                ..
            } => {
                let v = self.x.get(*split_feature).copied().unwrap_or(0.0);
                let (hot, cold) = if v < *threshold { (*left, *right) } else { (*right, *left) };
                let cover = self.tree.cover(node);
                let hot_zero = self.tree.cover(hot) / cover;
                let cold_zero = self.tree.cover(cold) / cover;

                let mut incoming_zero = 1.0;
                let mut incoming_one = 1.0;
                if let Some(k) = path.iter().position(|el| el.feature == Some(*split_feature)) {
                    incoming_zero = path[k].zero_fraction;
                    incoming_one = path[k].one_fraction;
                    unwind_path(&mut path, k);
                }

                self.recurse(hot, &path, hot_zero * incoming_zero, incoming_one, Some(*split_feature));
                self.recurse(cold, &path, cold_zero * incoming_zero, 0.0, Some(*split_feature));
            }
        }
    }
}

/// TreeSHAP values for one sample.
///
/// # Errors
/// Returns [`ExplainError::NotApplicable`] if the ensemble's baseline is not
/// a scalar, and [`ExplainError::Numerical`] if the result is not finite.
pub fn tree_shap(ensemble: &dyn TreeEnsemble, x: &[f64]) -> Result<TreeShapValues, ExplainError> {
    if let Some(reason) = ensemble.tree_attribution_blocker() {
        return Err(ExplainError::NotApplicable {
            method: crate::domain::AttributionMethod::TreeShap,
            reason,
        });
    }
    let n = ensemble.n_features();
    let k = ensemble.num_classes();
    let mut values = Array3::<f64>::zeros((1, k, n));
    let mut expected_value = vec![0.0; k];

    for class in 0..k {
        let scale = match ensemble.aggregation() {
            Aggregation::Sum => {
                expected_value[class] += ensemble.base_score().margin(class);
                1.0
            }
            Aggregation::Mean => 1.0 / ensemble.trees_for_class(class).max(1) as f64,
        };
        let mut phi = vec![0.0; n];
        for tree in ensemble.trees().iter().filter(|t| t.class_index() == class) {
            expected_value[class] += scale * tree.node_expectation(0);
            Walk {
                tree,
                x,
                phi: &mut phi,
                scale,
            }
            .recurse(0, &[], 1.0, 1.0, None);
        }
        for (f, v) in phi.into_iter().enumerate() {
            values[[0, class, f]] = v;
        }
    }

    if values.iter().chain(&expected_value).any(|v| !v.is_finite()) {
        return Err(ExplainError::Numerical(
            crate::domain::AttributionMethod::TreeShap,
        ));
    }
    Ok(TreeShapValues {
        values: values.into_dyn(),
        expected_value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::models::TreeEnsembleModel;
    use crate::ports::{BaseScore, Classifier};
    use ndarray::{s, Ix3};

    /// Depth-2 tree reading feature 0 then feature 1, with uneven covers.
    fn depth_two(class: usize) -> DecisionTree {
        DecisionTree::new(
            class,
            vec![
                TreeNode::Split {
                    feature: 0,
                    threshold: 0.5,
                    left: 1,
                    right: 2,
                    cover: None,
                },
                TreeNode::Split {
                    feature: 1,
                    threshold: 0.5,
                    left: 3,
                    right: 4,
                    cover: None,
                },
                TreeNode::Leaf {
                    value: 0.8,
                    cover: Some(30.0),
                },
                TreeNode::Leaf {
                    value: -1.0,
                    cover: Some(50.0),
                },
                TreeNode::Leaf {
                    value: 2.0,
                    cover: Some(20.0),
                },
            ],
        )
        .expect("valid tree")
    }

    /// Tree that splits on feature 0 twice along one path.
    fn repeated_feature(class: usize) -> DecisionTree {
        DecisionTree::new(
            class,
            vec![
                TreeNode::Split {
                    feature: 0,
                    threshold: 10.0,
                    left: 1,
                    right: 2,
                    cover: None,
                },
                TreeNode::Split {
                    feature: 0,
                    threshold: 5.0,
                    left: 3,
                    right: 4,
                    cover: None,
                },
                TreeNode::Split {
                    feature: 2,
                    threshold: 1.0,
                    left: 5,
                    right: 6,
                    cover: None,
                },
                TreeNode::Leaf {
                    value: -0.5,
                    cover: Some(10.0),
                },
                TreeNode::Leaf {
                    value: 0.25,
                    cover: Some(30.0),
                },
                TreeNode::Leaf {
                    value: 1.5,
                    cover: Some(25.0),
                },
                TreeNode::Leaf {
                    value: 0.1,
                    cover: Some(35.0),
                },
            ],
        )
        .expect("valid tree")
    }

    fn booster(base: BaseScore) -> TreeEnsembleModel {
        TreeEnsembleModel::gradient_boosting(
            2,
            3,
            base,
            vec![depth_two(0), repeated_feature(0), depth_two(1), repeated_feature(1)],
        )
        .expect("booster")
    }

    fn margin(model: &TreeEnsembleModel, class: usize, x: &[f64]) -> f64 {
        model.base_score().margin(class)
            + model
                .trees()
                .iter()
                .filter(|t| t.class_index() == class)
                .map(|t| t.predict(x))
                .sum::<f64>()
    }

    #[test]
    fn test_local_accuracy() {
        let model = booster(BaseScore::Scalar(0.5));
        for x in [[0.0, 0.0, 0.0], [1.0, 0.0, 2.0], [0.2, 0.9, 0.5], [12.0, 3.0, 0.0], [7.0, 1.0, 1.0]] {
            let shap = tree_shap(&model, &x).expect("shap");
            let values = shap.values.into_dimensionality::<Ix3>().expect("3-D");
            assert_eq!(values.shape(), &[1, 2, 3]);
            for class in 0..2 {
                let total: f64 = values.slice(s![0, class, ..]).sum() + shap.expected_value[class];
                assert!(
                    (total - margin(&model, class, &x)).abs() < 1e-9,
                    "x={x:?} class={class}"
                );
            }
        }
    }

    #[test]
    fn test_unused_feature_gets_nothing() {
        let model = TreeEnsembleModel::gradient_boosting(
            2,
            3,
            BaseScore::Scalar(0.0),
            vec![depth_two(0), depth_two(1)],
        )
        .expect("booster");
        let shap = tree_shap(&model, &[1.0, 0.0, 9.0]).expect("shap");
        let values = shap.values.into_dimensionality::<Ix3>().expect("3-D");
        assert_eq!(values[[0, 0, 2]], 0.0);
        assert!(values[[0, 0, 0]] > 0.0);
    }

    #[test]
    fn test_single_split_matches_closed_form() {
        // One split: phi = f(x) - E[f] exactly.
        let tree = DecisionTree::new(
            0,
            vec![
                TreeNode::Split {
                    feature: 1,
                    threshold: 3.0,
                    left: 1,
                    right: 2,
                    cover: None,
                },
                TreeNode::Leaf {
                    value: 2.0,
                    cover: Some(1.0),
                },
                TreeNode::Leaf {
                    value: -2.0,
                    cover: Some(3.0),
                },
            ],
        )
        .expect("tree");
        let other = DecisionTree::new(1, vec![TreeNode::Leaf { value: 0.0, cover: None }]).expect("leaf");
        let model = TreeEnsembleModel::gradient_boosting(2, 2, BaseScore::Scalar(0.0), vec![tree, other])
            .expect("booster");
        let shap = tree_shap(&model, &[0.0, 1.0]).expect("shap");
        let values = shap.values.into_dimensionality::<Ix3>().expect("3-D");
        assert!((values[[0, 0, 1]] - 3.0).abs() < 1e-12);
        assert!((shap.expected_value[0] + 1.0).abs() < 1e-12);
        assert_eq!(model.n_classes(), 2);
    }

    #[test]
    fn test_array_base_score_is_refused_up_front() {
        let model = booster(BaseScore::PerClassArray(vec![0.5, 0.5]));
        assert!(matches!(
            tree_shap(&model, &[0.0, 0.0, 0.0]),
            Err(ExplainError::NotApplicable { .. })
        ));
    }
}
