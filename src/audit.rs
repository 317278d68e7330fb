//! Recoverable pipeline warnings.
//!
//! Each stage that substitutes a default instead of failing records a
//! [`PipelineWarning`] here. The trail is returned with the prediction so the
//! caller sees exactly which fallbacks shaped the result.

use serde::Serialize;
use std::fmt;
use tracing::warn;

/// A fallback taken by one pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineWarning {
    /// Feature derivation failed; the raw record was used instead.
    FeatureEngineeringFailed { reason: String },
    /// Category not in the encoder vocabulary; encoded as 0.
    UnknownCategory { column: String, value: String },
    /// Training column absent from the record; filled with a default.
    MissingFeature { column: String, default: f64 },
    /// Categorical value in a column with no encoder; replaced by 0.
    NonNumericFeature { column: String, value: String },
    /// Scaling failed; the unscaled matrix was used.
    ScalerFailed { reason: String },
    /// A base model failed; its stacked column is all zeros.
    BaseModelFailed { model: String, reason: String },
    /// The meta-model gave no probabilities; `[1 - label, label]` was used.
    ProbabilityApproximated { reason: String },
}

impl PipelineWarning {
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineWarning::FeatureEngineeringFailed { .. } => "feature_engineering_failed",
            PipelineWarning::UnknownCategory { .. } => "unknown_category",
            PipelineWarning::MissingFeature { .. } => "missing_feature",
            PipelineWarning::NonNumericFeature { .. } => "non_numeric_feature",
            PipelineWarning::ScalerFailed { .. } => "scaler_failed",
            PipelineWarning::BaseModelFailed { .. } => "base_model_failed",
            PipelineWarning::ProbabilityApproximated { .. } => "probability_approximated",
        }
    }
}

impl fmt::Display for PipelineWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineWarning::FeatureEngineeringFailed { reason } => {
                write!(f, "feature engineering failed, using raw record: {}", reason)
            }
            PipelineWarning::UnknownCategory { column, value } => {
                write!(f, "unknown category {:?} in column {}, encoded as 0", value, column)
            }
            PipelineWarning::MissingFeature { column, default } => {
                write!(f, "missing feature {}, filled with {}", column, default)
            }
            PipelineWarning::NonNumericFeature { column, value } => {
                write!(f, "non-numeric value {:?} in column {}, replaced by 0", value, column)
            }
            PipelineWarning::ScalerFailed { reason } => {
                write!(f, "scaling failed, using unscaled features: {}", reason)
            }
            PipelineWarning::BaseModelFailed { model, reason } => {
                write!(f, "base model {} failed, stacking zeros: {}", model, reason)
            }
            PipelineWarning::ProbabilityApproximated { reason } => {
                write!(f, "meta-model probabilities unavailable, using label: {}", reason)
            }
        }
    }
}

/// Ordered warning trail for one pipeline run.
#[derive(Debug, Default, Clone)]
pub struct Audit {
    warnings: Vec<PipelineWarning>,
}

impl Audit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a warning and emit it to the log.
    pub fn record(&mut self, warning: PipelineWarning) {
        warn!(kind = warning.kind(), "{}", warning);
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[PipelineWarning] {
        &self.warnings
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn into_warnings(self) -> Vec<PipelineWarning> {
        self.warnings
    }
}
