//! End-to-end inference over a loaded bundle.
//!
//! Records flow through feature engineering, preprocessing, the stacked
//! ensemble and the risk interpreter. Every recoverable problem along the
//! way lands in the run's [`Audit`].

use crate::audit::{Audit, PipelineWarning};
use crate::error::PipelineError;
use crate::feature_engineering::FeatureEngineer;
use crate::models::bundle::LoadedBundle;
use crate::models::ensemble::EnsemblePredictor;
use crate::preprocessing::Preprocessor;
use crate::risk::{RiskInterpreter, RiskPolicy};
use crate::types::features::EnhancedRecord;
use crate::types::patient::PatientRecord;
use crate::types::prediction::PredictionOutcome;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Named pipeline configurations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineVariant {
    Legacy,
    #[default]
    Extended,
}

/// Stage switches for one [`InferencePipeline`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOptions {
    /// Derive engineered columns before preprocessing
    pub feature_engineering: bool,
    /// Default-fill absent training columns instead of failing
    pub fill_missing: bool,
    /// Apply the fitted scaler
    pub scale: bool,
    pub policy: RiskPolicy,
    /// Replaces the bundle's calibrated threshold when set
    #[serde(default)]
    pub threshold_override: Option<f64>,
    /// Attach clinical recommendations (extended policy only)
    pub recommendations: bool,
}

impl PipelineOptions {
    /// Behaviour of the original service: raw columns, strict alignment,
    /// probability bands only.
    pub fn legacy() -> Self {
        Self {
            feature_engineering: false,
            fill_missing: false,
            scale: false,
            policy: RiskPolicy::Simple,
            threshold_override: None,
            recommendations: false,
        }
    }

    /// Engineered features, calibrated threshold and recommendations.
    pub fn extended() -> Self {
        Self {
            feature_engineering: true,
            fill_missing: true,
            scale: true,
            policy: RiskPolicy::Extended,
            threshold_override: None,
            recommendations: true,
        }
    }

    pub fn for_variant(variant: PipelineVariant) -> Self {
        match variant {
            PipelineVariant::Legacy => Self::legacy(),
            PipelineVariant::Extended => Self::extended(),
        }
    }

    pub fn with_threshold_override(mut self, threshold: Option<f64>) -> Self {
        self.threshold_override = threshold;
        self
    }

    pub fn with_recommendations(mut self, recommendations: bool) -> Self {
        self.recommendations = recommendations;
        self
    }

    /// Whether BMI and OGTT must be present on requests.
    pub fn requires_critical_features(&self) -> bool {
        self.feature_engineering
    }

    /// Whether requests get the legacy BMI/OGTT/Case Number defaults.
    pub fn uses_legacy_defaults(&self) -> bool {
        !self.feature_engineering
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::extended()
    }
}

/// Outcomes for every input record plus the audit trail of the run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineRun {
    pub outcomes: Vec<PredictionOutcome>,
    pub warnings: Vec<PipelineWarning>,
}

/// Stateless inference pipeline; safe to share between requests.
#[derive(Debug, Clone)]
pub struct InferencePipeline {
    options: PipelineOptions,
    engineer: FeatureEngineer,
    predictor: EnsemblePredictor,
}

impl InferencePipeline {
    pub fn new(options: PipelineOptions) -> Self {
        Self {
            options,
            engineer: FeatureEngineer::new(),
            predictor: EnsemblePredictor::new(),
        }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Decision threshold in effect for `loaded`.
    pub fn threshold(&self, loaded: &LoadedBundle) -> f64 {
        self.options
            .threshold_override
            .unwrap_or(loaded.preprocessing.optimal_threshold)
    }

    fn interpreter(&self, loaded: &LoadedBundle) -> RiskInterpreter {
        RiskInterpreter::new(
            self.options.policy,
            self.threshold(loaded),
            self.options.recommendations,
        )
    }

    /// Score a batch of records. Outcomes are in input order.
    pub fn run(
        &self,
        loaded: &LoadedBundle,
        records: &[PatientRecord],
    ) -> Result<PipelineRun, PipelineError> {
        let mut audit = Audit::new();
        if records.is_empty() {
            return Ok(PipelineRun {
                outcomes: Vec::new(),
                warnings: Vec::new(),
            });
        }

        let enhanced: Vec<EnhancedRecord> = if self.options.feature_engineering {
            records
                .iter()
                .map(|r| self.engineer.engineer(r, &mut audit))
                .collect()
        } else {
            records.iter().map(EnhancedRecord::from).collect()
        };

        let matrix = Preprocessor::new(&loaded.preprocessing)
            .with_fill_missing(self.options.fill_missing)
            .with_scaling(self.options.scale)
            .transform(&enhanced, &mut audit)?;
        debug!(
            rows = matrix.n_rows(),
            cols = matrix.n_cols(),
            "Feature matrix prepared"
        );

        let output = self.predictor.predict(&loaded.models, &matrix, &mut audit)?;

        let interpreter = self.interpreter(loaded);
        debug!(
            policy = ?interpreter.policy(),
            threshold = interpreter.threshold(),
            "Interpreting ensemble output"
        );
        let problem_type = loaded.bundle.problem_type;
        let outcomes = records
            .iter()
            .zip(output.labels.iter().zip(&output.probabilities))
            .map(|(record, (&label, &proba))| {
                interpreter.interpret(label, proba, problem_type, record)
            })
            .collect();

        Ok(PipelineRun {
            outcomes,
            warnings: audit.into_warnings(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::bundle::{ModelBundle, ProblemType};
    use crate::models::classifier::{ModelSet, ENSEMBLE_MODEL};
    use crate::models::linear::{LinearKind, LinearModel};
    use crate::preprocessing::{PreprocessingState, Scaler};
    use crate::types::patient::{columns, PatientData};
    use crate::types::prediction::{Label, RiskCategory};
    use std::collections::BTreeMap;

    fn bundle(feature_columns: &[&str], problem_type: ProblemType) -> LoadedBundle {
        let feature_columns: Vec<String> = feature_columns.iter().map(|c| c.to_string()).collect();
        let n = feature_columns.len();
        let models: ModelSet = vec![
            Box::new(LinearModel::new(
                "LogisticRegression",
                LinearKind::Logistic,
                vec![0.05; n],
                -6.0,
            )) as Box<dyn crate::models::classifier::Classifier>,
            Box::new(LinearModel::new(
                ENSEMBLE_MODEL,
                match problem_type {
                    ProblemType::Classification => LinearKind::Logistic,
                    ProblemType::Regression => LinearKind::LinearRegression,
                },
                vec![3.0],
                -1.5,
            )),
        ]
        .into_iter()
        .collect();

        LoadedBundle {
            bundle: ModelBundle {
                version: "test".to_string(),
                timestamp: None,
                problem_type,
                feature_columns: feature_columns.clone(),
                saved_models: vec![
                    ("LogisticRegression".to_string(), "lr.json".to_string()),
                    (ENSEMBLE_MODEL.to_string(), "meta.json".to_string()),
                ],
                score_metric: None,
                final_score: None,
                best_model: None,
                best_f1: None,
                best_accuracy: None,
                best_precision: None,
                best_recall: None,
                critical_features: None,
                fixes_applied: Vec::new(),
                validation: serde_json::Value::Null,
            },
            preprocessing: PreprocessingState {
                label_encoders: BTreeMap::new(),
                feature_columns,
                scaler: Scaler::identity(n),
                optimal_threshold: 0.5,
            },
            models,
        }
    }

    #[test]
    fn test_run_is_idempotent() {
        let loaded = bundle(&[columns::AGE, columns::OGTT], ProblemType::Classification);
        let pipeline = InferencePipeline::new(PipelineOptions::extended());
        let records = vec![
            PatientData::high_risk_sample().to_record(false),
            PatientData::low_risk_sample().to_record(false),
        ];

        let first = pipeline.run(&loaded, &records).unwrap();
        let second = pipeline.run(&loaded, &records).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.outcomes.len(), 2);
    }

    #[test]
    fn test_empty_batch() {
        let loaded = bundle(&[columns::AGE], ProblemType::Classification);
        let run = InferencePipeline::new(PipelineOptions::extended())
            .run(&loaded, &[])
            .unwrap();
        assert!(run.outcomes.is_empty());
        assert!(run.warnings.is_empty());
    }

    #[test]
    fn test_legacy_missing_column_is_fatal() {
        let loaded = bundle(&[columns::AGE, "BMI_Risk_Score"], ProblemType::Classification);
        let records = vec![PatientData::low_risk_sample().to_record(true)];

        let err = InferencePipeline::new(PipelineOptions::legacy())
            .run(&loaded, &records)
            .unwrap_err();
        assert!(
            matches!(err, PipelineError::MissingFeatures(ref cols) if cols == &["BMI_Risk_Score".to_string()])
        );
    }

    #[test]
    fn test_extended_fills_missing_column_with_warning() {
        let loaded = bundle(&[columns::AGE, "Unseen Column"], ProblemType::Classification);
        let records = vec![PatientData::low_risk_sample().to_record(false)];

        let run = InferencePipeline::new(PipelineOptions::extended())
            .run(&loaded, &records)
            .unwrap();
        assert_eq!(run.outcomes.len(), 1);
        assert!(run.warnings.iter().any(|w| w.kind() == "missing_feature"));
    }

    #[test]
    fn test_threshold_override_wins() {
        let loaded = bundle(&[columns::AGE], ProblemType::Classification);
        let pipeline =
            InferencePipeline::new(PipelineOptions::extended().with_threshold_override(Some(0.0)));
        assert_eq!(pipeline.threshold(&loaded), 0.0);

        let run = pipeline
            .run(&loaded, &[PatientData::low_risk_sample().to_record(false)])
            .unwrap();
        assert_eq!(run.outcomes[0].label, Label::Gdm);
    }

    #[test]
    fn test_legacy_regression_bundle() {
        let loaded = bundle(&[columns::AGE, columns::CASE_NUMBER], ProblemType::Regression);
        let run = InferencePipeline::new(PipelineOptions::legacy())
            .run(&loaded, &[PatientData::low_risk_sample().to_record(true)])
            .unwrap();

        let outcome = &run.outcomes[0];
        // Base model says class 0, so the regression meta-model outputs -1.5
        assert_eq!(outcome.gdm_probability, 0.0);
        assert_eq!(outcome.label, Label::NonGdm);
        assert_eq!(outcome.risk_category, RiskCategory::Low);
        assert!(outcome.recommendations.is_none());
    }
}
