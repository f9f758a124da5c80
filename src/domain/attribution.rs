//! Feature attribution entries and ranking.

use serde::{Deserialize, Serialize};

/// Maximum number of entries any method may report.
pub const MAX_ATTRIBUTIONS: usize = 10;

/// Attribution technique that produced an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributionMethod {
    /// Exact path-dependent tree SHAP
    TreeShap,
    /// Native per-feature decision-path contributions
    TreeContributions,
    /// Zero-out perturbation of the predicted-class probability
    Perturbation,
    /// Static model importances, request independent
    GlobalImportance,
    /// Sampled Shapley values over `predict_proba`
    BlackBox,
}

impl AttributionMethod {
    /// Entries at or below this absolute impact are dropped.
    #[must_use]
    pub fn min_abs_impact(&self) -> f64 {
        match self {
            // Margin-scale contributions are smaller than probability deltas.
            Self::TreeContributions => 0.001,
            _ => 0.01,
        }
    }

    /// How many ranked entries to keep.
    #[must_use]
    pub fn max_entries(&self) -> usize {
        match self {
            Self::TreeShap => 5,
            _ => MAX_ATTRIBUTIONS,
        }
    }

    /// Whether impacts carry a sign.
    #[must_use]
    pub fn is_signed(&self) -> bool {
        !matches!(self, Self::GlobalImportance)
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TreeShap => "tree_shap",
            Self::TreeContributions => "tree_contributions",
            Self::Perturbation => "perturbation",
            Self::GlobalImportance => "global_importance",
            Self::BlackBox => "black_box",
        }
    }
}

impl std::fmt::Display for AttributionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Effect of a feature on the prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Increases,
    Decreases,
    /// Unsigned importance
    Importance,
}

impl Direction {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Increases => "increases",
            Self::Decreases => "decreases",
            Self::Importance => "importance",
        }
    }
}

/// One ranked feature attribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributionEntry {
    pub feature: String,
    pub impact: f64,
    pub direction: Direction,
    pub method: AttributionMethod,
}

/// Filter, rank and truncate a per-feature attribution vector.
///
/// `names` and `values` are zipped; extra elements on either side are ignored.
#[must_use]
pub fn rank_attributions(
    names: &[String],
    values: &[f64],
    method: AttributionMethod,
) -> Vec<AttributionEntry> {
    let threshold = method.min_abs_impact();
    let mut entries: Vec<AttributionEntry> = names
        .iter()
        .zip(values)
        .filter(|(_, v)| v.is_finite() && v.abs() > threshold)
        .map(|(name, &impact)| {
            let (impact, direction) = if method.is_signed() {
                let direction = if impact > 0.0 {
                    Direction::Increases
                } else {
                    Direction::Decreases
                };
                (impact, direction)
            } else {
                (impact.abs(), Direction::Importance)
            };
            AttributionEntry {
                feature: name.clone(),
                impact,
                direction,
                method,
            }
        })
        .collect();

    entries.sort_by(|a, b| b.impact.abs().total_cmp(&a.impact.abs()));
    entries.truncate(method.max_entries());
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("f{i}")).collect()
    }

    #[test]
    fn test_rank_filters_and_orders() {
        let values = [0.005, -0.3, 0.2, 0.01, -0.02, f64::NAN];
        let ranked = rank_attributions(&names(6), &values, AttributionMethod::Perturbation);
        let features: Vec<&str> = ranked.iter().map(|e| e.feature.as_str()).collect();
        assert_eq!(features, vec!["f1", "f2", "f4"]);
        assert_eq!(ranked[0].direction, Direction::Decreases);
        assert_eq!(ranked[1].direction, Direction::Increases);
    }

    #[test]
    fn test_tree_shap_keeps_top_five() {
        let values: Vec<f64> = (1..=8).map(|i| f64::from(i) / 10.0).collect();
        let ranked = rank_attributions(&names(8), &values, AttributionMethod::TreeShap);
        assert_eq!(ranked.len(), 5);
        assert_eq!(ranked[0].feature, "f7");
    }

    #[test]
    fn test_fallback_methods_keep_top_ten() {
        let values = vec![0.5; 14];
        let ranked = rank_attributions(&names(14), &values, AttributionMethod::BlackBox);
        assert_eq!(ranked.len(), MAX_ATTRIBUTIONS);
    }

    #[test]
    fn test_contribution_threshold_is_finer() {
        let values = [0.005, 0.0005];
        let ranked = rank_attributions(&names(2), &values, AttributionMethod::TreeContributions);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].feature, "f0");
    }

    #[test]
    fn test_global_importance_is_unsigned() {
        let ranked = rank_attributions(&names(2), &[0.4, 0.1], AttributionMethod::GlobalImportance);
        assert!(ranked.iter().all(|e| e.direction == Direction::Importance));
        assert!(ranked.iter().all(|e| e.impact > 0.0));
    }

    #[test]
    fn test_direction_serializes_lowercase() {
        let json = serde_json::to_string(&Direction::Importance).expect("serialize");
        assert_eq!(json, "\"importance\"");
    }
}
