//! Stacked ensemble inference.
//!
//! Base model outputs become the meta-feature matrix fed to the
//! `Ensemble` meta-model, one column per base model in descriptor order.

use crate::audit::{Audit, PipelineWarning};
use crate::error::PipelineError;
use crate::models::classifier::ModelSet;
use crate::types::features::FeatureMatrix;
use tracing::debug;

/// Result of one ensemble pass over a feature matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct EnsembleOutput {
    /// Meta-model output per row (class for classifiers, raw value for regressors)
    pub labels: Vec<f64>,
    /// `[P(non-GDM), P(GDM)]` per row
    pub probabilities: Vec<[f64; 2]>,
    /// Stacked base model predictions, one column per base model
    pub base_predictions: FeatureMatrix,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct EnsemblePredictor;

impl EnsemblePredictor {
    pub fn new() -> Self {
        Self
    }

    /// Run every base model, stack the outputs and score them with the
    /// meta-model.
    pub fn predict(
        &self,
        models: &ModelSet,
        x: &FeatureMatrix,
        audit: &mut Audit,
    ) -> Result<EnsembleOutput, PipelineError> {
        let base_names: Vec<String> = models.base_models().map(|m| m.name().to_string()).collect();
        if base_names.is_empty() {
            return Err(PipelineError::NoBaseModels);
        }
        let ensemble = models.ensemble().ok_or(PipelineError::NoEnsembleModel)?;

        let n_rows = x.n_rows();
        let mut stacked = FeatureMatrix::zeros(base_names, n_rows);

        for (col, model) in models.base_models().enumerate() {
            match model.predict(x) {
                Ok(pred) if pred.len() == n_rows => {
                    debug!(model = %model.name(), "Base model prediction complete");
                    stacked.set_column(col, &pred);
                }
                Ok(pred) => {
                    // Column stays zero
                    audit.record(PipelineWarning::BaseModelFailed {
                        model: model.name().to_string(),
                        reason: format!("expected {} predictions, got {}", n_rows, pred.len()),
                    });
                }
                Err(e) => {
                    audit.record(PipelineWarning::BaseModelFailed {
                        model: model.name().to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        let labels = ensemble
            .predict(&stacked)
            .map_err(PipelineError::EnsembleFailed)?;

        let probabilities = match ensemble.predict_proba(&stacked) {
            Ok(probs) if probs.len() == labels.len() => probs,
            Ok(probs) => {
                audit.record(PipelineWarning::ProbabilityApproximated {
                    reason: format!(
                        "expected {} probability rows, got {}",
                        labels.len(),
                        probs.len()
                    ),
                });
                approximate(&labels)
            }
            Err(e) => {
                audit.record(PipelineWarning::ProbabilityApproximated {
                    reason: e.to_string(),
                });
                approximate(&labels)
            }
        };

        Ok(EnsembleOutput {
            labels,
            probabilities,
            base_predictions: stacked,
        })
    }
}

/// Degenerate probabilities from the predicted class.
fn approximate(labels: &[f64]) -> Vec<[f64; 2]> {
    labels.iter().map(|&label| [1.0 - label, label]).collect()
}
