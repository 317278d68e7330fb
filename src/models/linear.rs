//! Native linear models serialized as JSON artifacts.
//!
//! Stacking meta-models are usually small linear learners, so bundles may
//! ship them (and simple base models) as JSON instead of ONNX:
//!
//! ```json
//! { "kind": "logistic", "coefficients": [2.1, 1.7], "intercept": -1.9 }
//! ```

use crate::error::ModelError;
use crate::models::classifier::Classifier;
use crate::types::features::FeatureMatrix;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinearKind {
    /// Logistic regression: sigmoid of the decision function.
    Logistic,
    /// Linear support vector classifier; no probabilities.
    LinearSvc,
    /// Least-squares regressor; predicts the raw decision value.
    LinearRegression,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    #[serde(skip)]
    name: String,
    pub kind: LinearKind,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    /// Class values for decision <= 0 and > 0 respectively.
    #[serde(default = "default_classes")]
    pub classes: [f64; 2],
}

fn default_classes() -> [f64; 2] {
    [0.0, 1.0]
}

impl LinearModel {
    pub fn new(name: &str, kind: LinearKind, coefficients: Vec<f64>, intercept: f64) -> Self {
        Self {
            name: name.to_string(),
            kind,
            coefficients,
            intercept,
            classes: default_classes(),
        }
    }

    /// Parse a JSON artifact and attach the descriptor name.
    pub fn from_json(name: &str, bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let mut model: LinearModel = serde_json::from_slice(bytes)?;
        model.name = name.to_string();
        Ok(model)
    }

    fn decision(&self, x: &FeatureMatrix) -> Result<Vec<f64>, ModelError> {
        if x.n_cols() != self.coefficients.len() {
            return Err(ModelError::ShapeMismatch {
                model: self.name.clone(),
                expected: self.coefficients.len(),
                actual: x.n_cols(),
            });
        }
        Ok(x.rows()
            .map(|row| {
                row.iter()
                    .zip(&self.coefficients)
                    .map(|(v, w)| v * w)
                    .sum::<f64>()
                    + self.intercept
            })
            .collect())
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

impl Classifier for LinearModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn predict(&self, x: &FeatureMatrix) -> Result<Vec<f64>, ModelError> {
        let decision = self.decision(x)?;
        Ok(match self.kind {
            LinearKind::LinearRegression => decision,
            LinearKind::Logistic | LinearKind::LinearSvc => decision
                .into_iter()
                .map(|d| if d > 0.0 { self.classes[1] } else { self.classes[0] })
                .collect(),
        })
    }

    fn predict_proba(&self, x: &FeatureMatrix) -> Result<Vec<[f64; 2]>, ModelError> {
        match self.kind {
            LinearKind::Logistic => Ok(self
                .decision(x)?
                .into_iter()
                .map(|d| {
                    let p = sigmoid(d);
                    [1.0 - p, p]
                })
                .collect()),
            LinearKind::LinearSvc | LinearKind::LinearRegression => {
                Err(ModelError::ProbabilityUnsupported {
                    model: self.name.clone(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(rows: Vec<Vec<f64>>) -> FeatureMatrix {
        let width = rows[0].len();
        let columns = (0..width).map(|i| format!("f{}", i)).collect();
        FeatureMatrix::from_rows(columns, rows).unwrap()
    }

    #[test]
    fn test_logistic_predicts_class_and_probability() {
        let model = LinearModel::new("lr", LinearKind::Logistic, vec![2.0, -1.0], 0.5);
        let x = matrix(vec![vec![1.0, 0.0], vec![-1.0, 1.0]]);

        assert_eq!(model.predict(&x).unwrap(), vec![1.0, 0.0]);
        let proba = model.predict_proba(&x).unwrap();
        assert!((proba[0][1] - sigmoid(2.5)).abs() < 1e-12);
        assert!((proba[1][0] + proba[1][1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_svc_has_no_probabilities() {
        let model = LinearModel::new("svc", LinearKind::LinearSvc, vec![1.0], 0.0);
        let x = matrix(vec![vec![0.3]]);
        assert_eq!(model.predict(&x).unwrap(), vec![1.0]);
        assert!(matches!(
            model.predict_proba(&x),
            Err(ModelError::ProbabilityUnsupported { .. })
        ));
    }

    #[test]
    fn test_regression_returns_raw_value() {
        let model = LinearModel::new("reg", LinearKind::LinearRegression, vec![0.5], 0.1);
        let x = matrix(vec![vec![1.0]]);
        assert_eq!(model.predict(&x).unwrap(), vec![0.6]);
    }

    #[test]
    fn test_shape_mismatch_is_reported() {
        let model = LinearModel::new("lr", LinearKind::Logistic, vec![1.0, 1.0], 0.0);
        let x = matrix(vec![vec![1.0]]);
        assert!(matches!(
            model.predict(&x),
            Err(ModelError::ShapeMismatch { expected: 2, actual: 1, .. })
        ));
    }

    #[test]
    fn test_from_json_defaults_classes() {
        let json = br#"{"kind":"linear_svc","coefficients":[1.0],"intercept":0.0}"#;
        let model = LinearModel::from_json("SVM", json).unwrap();
        assert_eq!(model.name(), "SVM");
        assert_eq!(model.classes, [0.0, 1.0]);
        assert_eq!(model.kind, LinearKind::LinearSvc);
    }
}
