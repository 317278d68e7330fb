//! Reply payloads published back to requesters

use crate::audit::PipelineWarning;
use crate::error::{FieldError, ServiceError};
use crate::models::bundle::{LoadedBundle, ProblemType};
use crate::types::prediction::PredictionOutcome;
use chrono::{DateTime, Utc};
use serde::Serialize;

const PREDICTION_MESSAGE: &str = "Prediction completed successfully";

/// Reply to a single-patient prediction
#[derive(Debug, Clone, Serialize)]
pub struct PredictionResponse {
    pub success: bool,

    #[serde(flatten)]
    pub outcome: PredictionOutcome,

    pub timestamp: DateTime<Utc>,

    pub model_version: String,

    pub message: String,

    /// Recovered problems encountered while scoring this request
    pub warnings: Vec<PipelineWarning>,

    pub request_id: String,
}

impl PredictionResponse {
    pub fn new(
        outcome: PredictionOutcome,
        model_version: &str,
        warnings: Vec<PipelineWarning>,
    ) -> Self {
        Self {
            success: true,
            outcome,
            timestamp: Utc::now(),
            model_version: model_version.to_string(),
            message: PREDICTION_MESSAGE.to_string(),
            warnings,
            request_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

/// Reply to a batch prediction; outcomes are in input order
#[derive(Debug, Clone, Serialize)]
pub struct BatchResponse {
    pub success: bool,
    pub count: usize,
    pub predictions: Vec<PredictionOutcome>,
    pub timestamp: DateTime<Utc>,
    pub model_version: String,
    pub message: String,
    pub warnings: Vec<PipelineWarning>,
    pub request_id: String,
}

impl BatchResponse {
    pub fn new(
        predictions: Vec<PredictionOutcome>,
        model_version: &str,
        warnings: Vec<PipelineWarning>,
    ) -> Self {
        Self {
            success: true,
            count: predictions.len(),
            predictions,
            timestamp: Utc::now(),
            model_version: model_version.to_string(),
            message: PREDICTION_MESSAGE.to_string(),
            warnings,
            request_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

/// Failure reply for any route
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    /// Machine readable kind, e.g. `validation_failure`
    pub error: String,
    /// HTTP-equivalent status
    pub status: u16,
    pub detail: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub field_errors: Vec<FieldError>,
    pub timestamp: DateTime<Utc>,
}

impl From<&ServiceError> for ErrorResponse {
    fn from(err: &ServiceError) -> Self {
        let field_errors = match err {
            ServiceError::Validation(v) => v.fields.clone(),
            _ => Vec::new(),
        };
        Self {
            success: false,
            error: err.kind().to_string(),
            status: err.status(),
            detail: err.to_string(),
            field_errors,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

/// Bundle summary included in a healthy health reply
#[derive(Debug, Clone, Serialize)]
pub struct BundleSummary {
    pub model_version: String,
    pub problem_type: ProblemType,
    pub best_model: Option<String>,
    pub best_f1_score: Option<f64>,
    pub features_count: usize,
    pub fixes_applied: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub model_loaded: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub bundle: Option<BundleSummary>,
    /// Why the bundle failed to load
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthResponse {
    pub fn healthy(loaded: &LoadedBundle) -> Self {
        let bundle = &loaded.bundle;
        Self {
            status: HealthStatus::Healthy,
            model_loaded: true,
            timestamp: Utc::now(),
            bundle: Some(BundleSummary {
                model_version: bundle.version.clone(),
                problem_type: bundle.problem_type,
                best_model: bundle.best_model.clone(),
                best_f1_score: bundle.best_f1,
                features_count: bundle.feature_columns.len(),
                fixes_applied: bundle.fixes_applied.clone(),
            }),
            error: None,
        }
    }

    pub fn degraded(reason: &str) -> Self {
        Self {
            status: HealthStatus::Degraded,
            model_loaded: false,
            timestamp: Utc::now(),
            bundle: None,
            error: Some(reason.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceMetrics {
    pub best_f1: Option<f64>,
    pub best_accuracy: Option<f64>,
    pub best_precision: Option<f64>,
    pub best_recall: Option<f64>,
}

/// Detailed description of the loaded bundle
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfoResponse {
    pub model_version: String,
    pub timestamp: Option<String>,
    pub problem_type: ProblemType,
    pub best_model: Option<String>,
    pub score_metric: Option<String>,
    pub final_score: Option<f64>,
    pub performance_metrics: PerformanceMetrics,
    pub feature_columns: Vec<String>,
    pub critical_features: Vec<String>,
    pub saved_models: Vec<String>,
    pub fixes_applied: Vec<String>,
    pub validation_status: serde_json::Value,
    /// Threshold the pipeline applies to P(GDM)
    pub decision_threshold: f64,
}

impl ModelInfoResponse {
    pub fn new(loaded: &LoadedBundle, decision_threshold: f64) -> Self {
        let bundle = &loaded.bundle;
        Self {
            model_version: bundle.version.clone(),
            timestamp: bundle.timestamp.clone(),
            problem_type: bundle.problem_type,
            best_model: bundle.best_model.clone(),
            score_metric: bundle.score_metric.clone(),
            final_score: bundle.final_score,
            performance_metrics: PerformanceMetrics {
                best_f1: bundle.best_f1,
                best_accuracy: bundle.best_accuracy,
                best_precision: bundle.best_precision,
                best_recall: bundle.best_recall,
            },
            feature_columns: bundle.feature_columns.clone(),
            critical_features: bundle.critical_features(),
            saved_models: bundle.model_names(),
            fixes_applied: bundle.fixes_applied.clone(),
            validation_status: bundle.validation.clone(),
            decision_threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{PipelineError, ValidationError};

    #[test]
    fn test_validation_error_reply_lists_fields() {
        let err = ServiceError::from(ValidationError::single("Dia BP", "must be below Sys BP"));
        let reply = ErrorResponse::from(&err);
        let json = serde_json::to_value(&reply).unwrap();

        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "validation_failure");
        assert_eq!(json["status"], 422);
        assert_eq!(json["field_errors"][0]["field"], "Dia BP");
    }

    #[test]
    fn test_prediction_failure_detail() {
        let err = ServiceError::from(PipelineError::NoBaseModels);
        let reply = ErrorResponse::from(&err);

        assert_eq!(
            reply.detail,
            "Prediction failed: No individual models available for prediction"
        );
        let json = serde_json::to_value(&reply).unwrap();
        assert!(json.get("field_errors").is_none());
    }

    #[test]
    fn test_degraded_health_omits_bundle_fields() {
        let json = serde_json::to_value(HealthResponse::degraded("artifact missing")).unwrap();

        assert_eq!(json["status"], "degraded");
        assert_eq!(json["model_loaded"], false);
        assert_eq!(json["error"], "artifact missing");
        assert!(json.get("model_version").is_none());
    }
}
