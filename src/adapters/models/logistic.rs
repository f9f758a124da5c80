//! Multinomial logistic regression.

use super::trees::softmax;
use crate::ports::{Classifier, ClassifierError};

#[derive(Debug, Clone)]
pub struct LogisticModel {
    /// `coefficients[class][feature]`
    coefficients: Vec<Vec<f64>>,
    intercepts: Vec<f64>,
}

impl LogisticModel {
    /// # Errors
    /// Returns error if the coefficient matrix is ragged, empty, or does not
    /// match the intercepts.
    pub fn new(coefficients: Vec<Vec<f64>>, intercepts: Vec<f64>) -> Result<Self, ClassifierError> {
        if coefficients.len() < 2 {
            return Err(ClassifierError::InvalidModel(format!(
                "need at least 2 classes, got {}",
                coefficients.len()
            )));
        }
        if intercepts.len() != coefficients.len() {
            return Err(ClassifierError::InvalidModel(format!(
                "{} intercepts for {} classes",
                intercepts.len(),
                coefficients.len()
            )));
        }
        let width = coefficients[0].len();
        if width == 0 || coefficients.iter().any(|row| row.len() != width) {
            return Err(ClassifierError::InvalidModel(
                "coefficient rows must be non-empty and equally long".into(),
            ));
        }
        if coefficients.iter().flatten().chain(&intercepts).any(|c| !c.is_finite()) {
            return Err(ClassifierError::InvalidModel("non-finite coefficient".into()));
        }
        Ok(Self {
            coefficients,
            intercepts,
        })
    }
}

impl Classifier for LogisticModel {
    fn kind(&self) -> &'static str {
        "logistic"
    }

    fn n_features(&self) -> usize {
        self.coefficients[0].len()
    }

    fn n_classes(&self) -> usize {
        self.coefficients.len()
    }

    fn predict_proba(&self, x: &[f64]) -> Result<Vec<f64>, ClassifierError> {
        let expected = self.n_features();
        if x.len() != expected {
            return Err(ClassifierError::InputWidth {
                expected,
                got: x.len(),
            });
        }
        let margins: Vec<f64> = self
            .coefficients
            .iter()
            .zip(&self.intercepts)
            .map(|(row, b)| b + row.iter().zip(x).map(|(w, v)| w * v).sum::<f64>())
            .collect();
        let proba = softmax(&margins);
        if proba.iter().any(|p| !p.is_finite()) {
            return Err(ClassifierError::NoProbabilities("non-finite probability".into()));
        }
        Ok(proba)
    }

    /// Mean absolute coefficient per feature, normalised.
    fn feature_importances(&self) -> Option<Vec<f64>> {
        let k = self.coefficients.len() as f64;
        let raw: Vec<f64> = (0..self.n_features())
            .map(|j| self.coefficients.iter().map(|row| row[j].abs()).sum::<f64>() / k)
            .collect();
        let total: f64 = raw.iter().sum();
        if total <= 0.0 {
            return None;
        }
        Some(raw.into_iter().map(|v| v / total).collect())
    }
}
