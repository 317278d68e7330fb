//! Categorical encoding, schema alignment and scaling.
//!
//! [`PreprocessingState`] is the training-time state saved next to the models
//! (`preprocessing.json`). [`Preprocessor`] applies it to engineered records
//! and yields the aligned matrix the base models consume.

use crate::audit::{Audit, PipelineWarning};
use crate::error::PipelineError;
use crate::types::features::{EnhancedRecord, FeatureMatrix, FeatureValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

pub const DEFAULT_DECISION_THRESHOLD: f64 = 0.5;

#[derive(Debug, Error, PartialEq)]
#[error("unknown category {value:?}")]
pub struct UnknownCategory {
    pub value: String,
}

/// Ordered vocabulary; a label's code is its position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelEncoder {
    pub classes: Vec<String>,
}

impl LabelEncoder {
    pub fn new<S: Into<String>>(classes: impl IntoIterator<Item = S>) -> Self {
        Self {
            classes: classes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn transform(&self, value: &str) -> Result<usize, UnknownCategory> {
        self.classes
            .iter()
            .position(|c| c == value)
            .ok_or_else(|| UnknownCategory {
                value: value.to_string(),
            })
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ScalerError {
    #[error("scaler fitted on {expected} features, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Per-feature standardization: `(x - center) / scale`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scaler {
    pub center: Vec<f64>,
    pub scale: Vec<f64>,
}

impl Scaler {
    /// Identity transform for `n` features.
    pub fn identity(n: usize) -> Self {
        Self {
            center: vec![0.0; n],
            scale: vec![1.0; n],
        }
    }

    pub fn transform(&self, matrix: &FeatureMatrix) -> Result<FeatureMatrix, ScalerError> {
        let n = matrix.n_cols();
        if self.center.len() != n || self.scale.len() != n {
            return Err(ScalerError::DimensionMismatch {
                expected: self.center.len().min(self.scale.len()),
                actual: n,
            });
        }

        let mut out = matrix.clone();
        for row in 0..matrix.n_rows() {
            for col in 0..n {
                // Zero-variance features are left unscaled
                let scale = if self.scale[col] == 0.0 { 1.0 } else { self.scale[col] };
                out.set(row, col, (matrix.get(row, col) - self.center[col]) / scale);
            }
        }
        Ok(out)
    }
}

/// Training-time preprocessing state, immutable after load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessingState {
    #[serde(default)]
    pub label_encoders: BTreeMap<String, LabelEncoder>,
    pub feature_columns: Vec<String>,
    pub scaler: Scaler,
    #[serde(default = "default_threshold")]
    pub optimal_threshold: f64,
}

fn default_threshold() -> f64 {
    DEFAULT_DECISION_THRESHOLD
}

impl PreprocessingState {
    /// Structural checks run once at load time.
    pub fn check(&self) -> Result<(), String> {
        if self.feature_columns.is_empty() {
            return Err("feature_columns is empty".to_string());
        }
        if !(0.0..=1.0).contains(&self.optimal_threshold) {
            return Err(format!(
                "optimal_threshold {} outside [0, 1]",
                self.optimal_threshold
            ));
        }
        Ok(())
    }
}

/// Fill value for a training column missing from the record.
pub fn default_fill(column: &str) -> f64 {
    if column.contains("Risk") || column.contains("Score") {
        return 0.0;
    }
    match column {
        "Age" => 28.0,
        "BMI" => 23.0,
        "OGTT" => 120.0,
        "Hemoglobin" => 12.0,
        "HDL" => 50.0,
        _ => 0.0,
    }
}

/// Applies a [`PreprocessingState`] to engineered records.
pub struct Preprocessor<'a> {
    state: &'a PreprocessingState,
    fill_missing: bool,
    scale: bool,
}

impl<'a> Preprocessor<'a> {
    pub fn new(state: &'a PreprocessingState) -> Self {
        Self {
            state,
            fill_missing: true,
            scale: true,
        }
    }

    /// Whether absent training columns are default-filled (otherwise fatal).
    pub fn with_fill_missing(mut self, fill_missing: bool) -> Self {
        self.fill_missing = fill_missing;
        self
    }

    pub fn with_scaling(mut self, scale: bool) -> Self {
        self.scale = scale;
        self
    }

    /// Encode, align and scale a batch of records.
    pub fn transform(
        &self,
        records: &[EnhancedRecord],
        audit: &mut Audit,
    ) -> Result<FeatureMatrix, PipelineError> {
        let columns = self.state.feature_columns.clone();
        let mut matrix = FeatureMatrix::zeros(columns.clone(), records.len());
        let mut missing: Vec<String> = Vec::new();

        for (row, record) in records.iter().enumerate() {
            let encoded = self.encode(record, audit);

            for (col, column) in columns.iter().enumerate() {
                let value = match encoded.get(column) {
                    Some(FeatureValue::Number(v)) => *v,
                    Some(FeatureValue::Category(label)) => {
                        audit.record(PipelineWarning::NonNumericFeature {
                            column: column.clone(),
                            value: label.clone(),
                        });
                        0.0
                    }
                    None if self.fill_missing => {
                        let default = default_fill(column);
                        audit.record(PipelineWarning::MissingFeature {
                            column: column.clone(),
                            default,
                        });
                        default
                    }
                    None => {
                        if !missing.contains(column) {
                            missing.push(column.clone());
                        }
                        continue;
                    }
                };
                matrix.set(row, col, value);
            }
        }

        if !missing.is_empty() {
            return Err(PipelineError::MissingFeatures(missing));
        }

        if !self.scale {
            return Ok(matrix);
        }

        match self.state.scaler.transform(&matrix) {
            Ok(scaled) => Ok(scaled),
            Err(e) => {
                audit.record(PipelineWarning::ScalerFailed {
                    reason: e.to_string(),
                });
                Ok(matrix)
            }
        }
    }

    /// Replace categorical values of encoded columns by their codes.
    fn encode(&self, record: &EnhancedRecord, audit: &mut Audit) -> EnhancedRecord {
        let mut out = record.clone();
        for (column, encoder) in &self.state.label_encoders {
            let Some(label) = record.category(column) else {
                continue;
            };
            let code = match encoder.transform(label) {
                Ok(code) => code as f64,
                Err(e) => {
                    audit.record(PipelineWarning::UnknownCategory {
                        column: column.clone(),
                        value: e.value,
                    });
                    0.0
                }
            };
            out.set_number(column, code);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(columns: &[&str]) -> PreprocessingState {
        let mut label_encoders = BTreeMap::new();
        label_encoders.insert(
            "BMI_Category".to_string(),
            LabelEncoder::new(["Normal", "Obese", "Overweight", "Underweight"]),
        );
        PreprocessingState {
            label_encoders,
            feature_columns: columns.iter().map(|c| c.to_string()).collect(),
            scaler: Scaler::identity(columns.len()),
            optimal_threshold: 0.5,
        }
    }

    #[test]
    fn test_label_encoder_codes_by_position() {
        let encoder = LabelEncoder::new(["Diabetic", "Impaired", "Normal"]);
        assert_eq!(encoder.transform("Normal"), Ok(2));
        assert!(encoder.transform("Severe").is_err());
    }

    #[test]
    fn test_default_fill_policy() {
        assert_eq!(default_fill("OGTT_Risk_Score"), 0.0);
        assert_eq!(default_fill("Comprehensive_Risk_Score"), 0.0);
        assert_eq!(default_fill("Age"), 28.0);
        assert_eq!(default_fill("BMI"), 23.0);
        assert_eq!(default_fill("OGTT"), 120.0);
        assert_eq!(default_fill("Hemoglobin"), 12.0);
        assert_eq!(default_fill("HDL"), 50.0);
        assert_eq!(default_fill("PCOS"), 0.0);
    }

    #[test]
    fn test_alignment_reorders_drops_and_fills() {
        let state = state(&["HDL", "BMI_Category", "Age", "BMI_Risk_Score"]);
        let mut record = EnhancedRecord::new();
        record.set_number("Age", 31.0);
        record.set_category("BMI_Category", "Obese");
        record.set_number("Extra", 99.0);

        let mut audit = Audit::new();
        let matrix = Preprocessor::new(&state)
            .transform(&[record], &mut audit)
            .unwrap();

        assert_eq!(matrix.row(0), &[50.0, 1.0, 31.0, 0.0]);
        let kinds: Vec<_> = audit.warnings().iter().map(|w| w.kind()).collect();
        assert_eq!(kinds, vec!["missing_feature", "missing_feature"]);
    }

    #[test]
    fn test_unknown_category_encodes_to_zero() {
        let state = state(&["BMI_Category"]);
        let mut record = EnhancedRecord::new();
        record.set_category("BMI_Category", "Gigantic");

        let mut audit = Audit::new();
        let matrix = Preprocessor::new(&state)
            .transform(&[record], &mut audit)
            .unwrap();

        assert_eq!(matrix.row(0), &[0.0]);
        assert_eq!(audit.warnings()[0].kind(), "unknown_category");
    }

    #[test]
    fn test_unencoded_category_becomes_zero() {
        let state = state(&["OGTT_Category"]);
        let mut record = EnhancedRecord::new();
        record.set_category("OGTT_Category", "Impaired");

        let mut audit = Audit::new();
        let matrix = Preprocessor::new(&state)
            .transform(&[record], &mut audit)
            .unwrap();
        assert_eq!(matrix.row(0), &[0.0]);
        assert_eq!(audit.warnings()[0].kind(), "non_numeric_feature");
    }

    #[test]
    fn test_scaler_standardizes_and_ignores_zero_scale() {
        let mut state = state(&["Age", "HDL"]);
        state.scaler = Scaler {
            center: vec![30.0, 50.0],
            scale: vec![5.0, 0.0],
        };
        let mut record = EnhancedRecord::new();
        record.set_number("Age", 40.0);
        record.set_number("HDL", 55.0);

        let mut audit = Audit::new();
        let matrix = Preprocessor::new(&state)
            .transform(&[record], &mut audit)
            .unwrap();
        assert_eq!(matrix.row(0), &[2.0, 5.0]);
        assert!(audit.is_empty());
    }

    #[test]
    fn test_scaler_mismatch_falls_back_to_unscaled() {
        let mut state = state(&["Age", "HDL"]);
        state.scaler = Scaler::identity(3);
        let mut record = EnhancedRecord::new();
        record.set_number("Age", 40.0);
        record.set_number("HDL", 55.0);

        let mut audit = Audit::new();
        let matrix = Preprocessor::new(&state)
            .transform(&[record], &mut audit)
            .unwrap();
        assert_eq!(matrix.row(0), &[40.0, 55.0]);
        assert_eq!(audit.warnings()[0].kind(), "scaler_failed");
    }

    #[test]
    fn test_legacy_mode_rejects_missing_columns() {
        let state = state(&["Age", "HDL"]);
        let mut record = EnhancedRecord::new();
        record.set_number("Age", 40.0);

        let mut audit = Audit::new();
        let err = Preprocessor::new(&state)
            .with_fill_missing(false)
            .with_scaling(false)
            .transform(&[record], &mut audit)
            .unwrap_err();
        assert!(matches!(err, PipelineError::MissingFeatures(ref cols) if cols == &vec!["HDL".to_string()]));
    }

    #[test]
    fn test_state_check_rejects_bad_threshold() {
        let mut state = state(&["Age"]);
        state.optimal_threshold = 1.5;
        assert!(state.check().is_err());
    }
}
