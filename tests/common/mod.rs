//! Shared fixtures: a small but complete model bundle on disk.
//!
//! Features are `Age, BMI, OGTT, BMI_Category, Comprehensive_Risk_Score`.
//! `LogisticRegression` fires when the comprehensive score exceeds 5,
//! `LinearSVC` when OGTT exceeds 140. The logistic meta-model gives
//! P(GDM) = sigmoid(3·a + 3·b − 3): 0.047, 0.5 or 0.953.

#![allow(dead_code)]

use std::fs;
use std::path::Path;

pub const FEATURES: &str = r#"["Age", "BMI", "OGTT", "BMI_Category", "Comprehensive_Risk_Score"]"#;

pub fn metadata(saved_models: &str) -> String {
    format!(
        r#"{{
            "version": "2024.06-test",
            "timestamp": "2024-06-01T12:00:00",
            "problem_type": "classification",
            "feature_columns": {features},
            "saved_models": {saved_models},
            "score_metric": "f1",
            "final_score": 0.91,
            "best_model": "Ensemble",
            "best_f1": 0.91,
            "best_accuracy": 0.93,
            "fixes_applied": ["threshold_calibration"],
            "validation": {{"passed": true}}
        }}"#,
        features = FEATURES,
        saved_models = saved_models
    )
}

pub fn preprocessing(threshold: f64) -> String {
    format!(
        r#"{{
            "label_encoders": {{"BMI_Category": {{"classes": ["Normal", "Obese", "Overweight"]}}}},
            "feature_columns": {features},
            "scaler": {{
                "center": [28.0, 25.0, 140.0, 0.0, 5.0],
                "scale": [5.0, 5.0, 40.0, 1.0, 5.0]
            }},
            "optimal_threshold": {threshold}
        }}"#,
        features = FEATURES,
        threshold = threshold
    )
}

pub const LOGISTIC_BASE: &str =
    r#"{"kind": "logistic", "coefficients": [0.0, 0.0, 0.0, 0.0, 2.0], "intercept": 0.0}"#;
pub const SVC_BASE: &str =
    r#"{"kind": "linear_svc", "coefficients": [0.0, 0.0, 1.0, 0.0, 0.0], "intercept": 0.0}"#;
pub const LOGISTIC_META: &str =
    r#"{"kind": "logistic", "coefficients": [3.0, 3.0], "intercept": -3.0}"#;
pub const SVC_META: &str =
    r#"{"kind": "linear_svc", "coefficients": [1.0, 1.0], "intercept": -1.5}"#;

pub const SAVED_MODELS: &str =
    r#"{"LogisticRegression": "lr.json", "LinearSVC": "svc.json", "Ensemble": "ensemble.json"}"#;

/// Write the standard bundle into `dir` with the given meta-model.
pub fn write_bundle(dir: &Path, meta_model: &str, threshold: f64) {
    fs::write(dir.join("model_metadata.json"), metadata(SAVED_MODELS)).unwrap();
    fs::write(dir.join("preprocessing.json"), preprocessing(threshold)).unwrap();
    fs::write(dir.join("lr.json"), LOGISTIC_BASE).unwrap();
    fs::write(dir.join("svc.json"), SVC_BASE).unwrap();
    fs::write(dir.join("ensemble.json"), meta_model).unwrap();
}

pub fn standard_bundle() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    write_bundle(dir.path(), LOGISTIC_META, 0.5);
    dir
}
