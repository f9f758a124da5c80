//! Model-agnostic attribution over `predict_proba`.

use ndarray::Array1;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::ports::Classifier;

use super::ExplainError;

fn class_probability(classifier: &dyn Classifier, x: &[f64], class: usize) -> Result<f64, ExplainError> {
    let proba = classifier.predict_proba(x)?;
    proba.get(class).copied().ok_or(ExplainError::ClassOutOfRange {
        class,
        n_classes: proba.len(),
    })
}

/// Zero-out perturbation: for each feature, the drop in the predicted
/// class's probability when that feature is set to 0.
///
/// Positive values mean the feature supports the prediction. Costs one model
/// evaluation per feature.
///
/// # Errors
/// Propagates classifier failures.
pub fn perturbation(classifier: &dyn Classifier, x: &[f64], class: usize) -> Result<Array1<f64>, ExplainError> {
    let base = class_probability(classifier, x, class)?;
    let mut perturbed = x.to_vec();
    let mut deltas = Array1::zeros(x.len());
    for i in 0..x.len() {
        let original = perturbed[i];
        perturbed[i] = 0.0;
        deltas[i] = base - class_probability(classifier, &perturbed, class)?;
        perturbed[i] = original;
    }
    Ok(deltas)
}

/// Sampled Shapley values of the predicted-class probability against an
/// all-zero baseline.
///
/// Each sampled permutation adds features one at a time and credits each
/// with the probability change it causes, so the values of every
/// permutation, and therefore their mean, sum to `p(x) - p(0)`. Sampling is
/// seeded and reproducible.
///
/// # Errors
/// Propagates classifier failures.
pub fn black_box_shapley(
    classifier: &dyn Classifier,
    x: &[f64],
    class: usize,
    permutations: usize,
    seed: u64,
) -> Result<Array1<f64>, ExplainError> {
    let n = x.len();
    let permutations = permutations.max(1);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut order: Vec<usize> = (0..n).collect();
    let baseline = vec![0.0; n];
    let p_baseline = class_probability(classifier, &baseline, class)?;
    let mut phi = Array1::<f64>::zeros(n);

    for _ in 0..permutations {
        order.shuffle(&mut rng);
        let mut z = baseline.clone();
        let mut previous = p_baseline;
        for &feature in &order {
            z[feature] = x[feature];
            let current = class_probability(classifier, &z, class)?;
            phi[feature] += current - previous;
            previous = current;
        }
    }

    Ok(phi / permutations as f64)
}
