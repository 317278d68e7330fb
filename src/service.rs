//! Request handling over an immutable, shared service context.

use crate::error::{ArtifactError, PipelineError, ServiceError, ValidationError};
use crate::metrics::PipelineMetrics;
use crate::models::bundle::LoadedBundle;
use crate::pipeline::{InferencePipeline, PipelineOptions, PipelineRun};
use crate::types::patient::{PatientData, PatientInput, PatientRecord};
use crate::types::response::{
    BatchResponse, ErrorResponse, HealthResponse, ModelInfoResponse, PredictionResponse,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Subject suffixes handled by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Predict,
    PredictBatch,
    Health,
    ModelInfo,
    TestHighRisk,
    TestLowRisk,
}

impl Route {
    pub const ALL: [Route; 6] = [
        Route::Predict,
        Route::PredictBatch,
        Route::Health,
        Route::ModelInfo,
        Route::TestHighRisk,
        Route::TestLowRisk,
    ];

    pub fn suffix(&self) -> &'static str {
        match self {
            Route::Predict => "predict",
            Route::PredictBatch => "predict.batch",
            Route::Health => "health",
            Route::ModelInfo => "model_info",
            Route::TestHighRisk => "test.high_risk",
            Route::TestLowRisk => "test.low_risk",
        }
    }

    /// Resolve `<prefix>.<suffix>` to a route.
    pub fn from_subject(prefix: &str, subject: &str) -> Option<Route> {
        let suffix = subject.strip_prefix(prefix)?.strip_prefix('.')?;
        Route::ALL.into_iter().find(|r| r.suffix() == suffix)
    }

    pub fn subject(&self, prefix: &str) -> String {
        format!("{}.{}", prefix, self.suffix())
    }
}

/// Whether a usable bundle was loaded at startup.
#[derive(Debug, Clone)]
pub enum ModelState {
    Loaded(Arc<LoadedBundle>),
    Degraded { reason: String },
}

/// Everything a request handler needs; built once before serving.
pub struct ServiceContext {
    state: ModelState,
    pipeline: Arc<InferencePipeline>,
    timeout: Duration,
    metrics: Arc<PipelineMetrics>,
}

impl ServiceContext {
    pub fn new(
        state: ModelState,
        options: PipelineOptions,
        timeout: Duration,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            state,
            pipeline: Arc::new(InferencePipeline::new(options)),
            timeout,
            metrics,
        }
    }

    /// Build from a load attempt; a failed load degrades the service.
    pub fn from_load(
        result: Result<LoadedBundle, ArtifactError>,
        options: PipelineOptions,
        timeout: Duration,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        let state = match result {
            Ok(loaded) => {
                info!(
                    version = %loaded.bundle.version,
                    models = loaded.models.len(),
                    "Model bundle ready"
                );
                ModelState::Loaded(Arc::new(loaded))
            }
            Err(e) => {
                error!(error = %e, "Model bundle failed to load, serving in degraded mode");
                ModelState::Degraded {
                    reason: e.to_string(),
                }
            }
        };
        Self::new(state, options, timeout, metrics)
    }

    pub fn state(&self) -> &ModelState {
        &self.state
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.state, ModelState::Loaded(_))
    }

    pub fn options(&self) -> &PipelineOptions {
        self.pipeline.options()
    }

    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    fn loaded(&self) -> Result<Arc<LoadedBundle>, PipelineError> {
        match &self.state {
            ModelState::Loaded(loaded) => Ok(Arc::clone(loaded)),
            ModelState::Degraded { .. } => Err(PipelineError::ModelNotLoaded),
        }
    }

    fn prepare(&self, patient: &PatientData) -> Result<PatientRecord, ValidationError> {
        let options = self.pipeline.options();
        patient.validate(options.requires_critical_features())?;
        Ok(patient.to_record(options.uses_legacy_defaults()))
    }

    /// Score one validated patient.
    pub async fn predict(&self, patient: PatientData) -> Result<PredictionResponse, ServiceError> {
        let record = self.prepare(&patient)?;
        let loaded = self.loaded()?;
        debug!(
            age = patient.age,
            bmi = ?patient.bmi,
            ogtt = ?patient.ogtt,
            "Received prediction request"
        );

        let run = self.run(Arc::clone(&loaded), vec![record]).await?;
        let outcome = run
            .outcomes
            .into_iter()
            .next()
            .ok_or_else(|| PipelineError::Worker("pipeline returned no outcome".to_string()))?;

        info!(
            prediction = %outcome.label,
            probability = outcome.gdm_probability,
            risk = %outcome.risk_category,
            "Prediction complete"
        );
        Ok(PredictionResponse::new(
            outcome,
            &loaded.bundle.version,
            run.warnings,
        ))
    }

    /// Score any accepted input shape; every record is validated first.
    pub async fn predict_batch(&self, input: PatientInput) -> Result<BatchResponse, ServiceError> {
        let patients = input.into_patients()?;
        let records = patients
            .iter()
            .enumerate()
            .map(|(row, patient)| self.prepare(patient).map_err(|e| e.at_row(row)))
            .collect::<Result<Vec<_>, _>>()?;
        let loaded = self.loaded()?;

        let run = self.run(Arc::clone(&loaded), records).await?;
        info!(count = run.outcomes.len(), "Batch prediction complete");
        Ok(BatchResponse::new(
            run.outcomes,
            &loaded.bundle.version,
            run.warnings,
        ))
    }

    pub fn health(&self) -> HealthResponse {
        match &self.state {
            ModelState::Loaded(loaded) => HealthResponse::healthy(loaded),
            ModelState::Degraded { reason } => HealthResponse::degraded(reason),
        }
    }

    pub fn model_info(&self) -> Result<ModelInfoResponse, ServiceError> {
        let loaded = self.loaded()?;
        Ok(ModelInfoResponse::new(
            &loaded,
            self.pipeline.threshold(&loaded),
        ))
    }

    /// Run the CPU-bound pipeline off the async workers, bounded by the
    /// request timeout.
    async fn run(
        &self,
        loaded: Arc<LoadedBundle>,
        records: Vec<PatientRecord>,
    ) -> Result<PipelineRun, PipelineError> {
        let pipeline = Arc::clone(&self.pipeline);
        let task = tokio::task::spawn_blocking(move || pipeline.run(&loaded, &records));

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(PipelineError::Worker(e.to_string())),
            Err(_) => Err(PipelineError::Timeout(self.timeout.as_millis() as u64)),
        }
    }

    /// Decode a request payload, dispatch it and encode the reply.
    pub async fn handle(&self, route: Route, payload: &[u8]) -> Vec<u8> {
        let start = Instant::now();
        let result = match route {
            Route::Predict => match decode::<PatientData>(payload) {
                Ok(patient) => self.predict(patient).await.map(|r| self.encode_prediction(start, r)),
                Err(e) => Err(e),
            },
            Route::PredictBatch => match decode::<PatientInput>(payload) {
                Ok(input) => self.predict_batch(input).await.map(|r| self.encode_batch(start, r)),
                Err(e) => Err(e),
            },
            Route::TestHighRisk => self
                .predict(PatientData::high_risk_sample())
                .await
                .map(|r| self.encode_prediction(start, r)),
            Route::TestLowRisk => self
                .predict(PatientData::low_risk_sample())
                .await
                .map(|r| self.encode_prediction(start, r)),
            Route::Health => Ok(encode(&self.health())),
            Route::ModelInfo => self.model_info().map(|info| encode(&info)),
        };

        match result {
            Ok(bytes) => bytes,
            Err(e) => {
                match &e {
                    ServiceError::Validation(_) | ServiceError::BadRequest(_) => {
                        warn!(route = route.suffix(), error = %e, "Request rejected");
                        self.metrics.record_rejection();
                    }
                    _ => {
                        error!(route = route.suffix(), error = %e, "Request failed");
                        self.metrics.record_failure(start.elapsed(), e.kind());
                    }
                }
                encode(&ErrorResponse::from(&e))
            }
        }
    }

    fn encode_prediction(&self, start: Instant, response: PredictionResponse) -> Vec<u8> {
        self.metrics.record_success(
            start.elapsed(),
            std::slice::from_ref(&response.outcome),
            &response.warnings,
        );
        encode(&response)
    }

    fn encode_batch(&self, start: Instant, response: BatchResponse) -> Vec<u8> {
        self.metrics
            .record_success(start.elapsed(), &response.predictions, &response.warnings);
        encode(&response)
    }
}

/// Malformed JSON is a bad request; well-formed JSON of the wrong shape is
/// a validation failure.
fn decode<T: serde::de::DeserializeOwned>(payload: &[u8]) -> Result<T, ServiceError> {
    serde_json::from_slice(payload).map_err(|e| match e.classify() {
        serde_json::error::Category::Data => {
            ServiceError::Validation(ValidationError::single("body", e.to_string()))
        }
        _ => ServiceError::BadRequest(e.to_string()),
    })
}

fn encode<T: Serialize>(value: &T) -> Vec<u8> {
    serde_json::to_vec(value).unwrap_or_else(|e| {
        error!(error = %e, "Failed to serialize reply");
        br#"{"success":false,"error":"internal","status":500}"#.to_vec()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModelError;
    use crate::models::classifier::{Classifier, ModelSet, ENSEMBLE_MODEL};
    use crate::models::linear::{LinearKind, LinearModel};
    use crate::types::features::FeatureMatrix;
    use crate::types::response::HealthStatus;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicBool, Ordering};

    fn degraded() -> ServiceContext {
        ServiceContext::from_load(
            Err(ArtifactError::Missing {
                path: "latest/model_metadata.json".into(),
            }),
            PipelineOptions::extended(),
            Duration::from_millis(500),
            Arc::new(PipelineMetrics::new()),
        )
    }

    #[test]
    fn test_route_from_subject() {
        assert_eq!(Route::from_subject("gdm", "gdm.predict"), Some(Route::Predict));
        assert_eq!(
            Route::from_subject("gdm", "gdm.predict.batch"),
            Some(Route::PredictBatch)
        );
        assert_eq!(
            Route::from_subject("gdm", "gdm.test.low_risk"),
            Some(Route::TestLowRisk)
        );
        assert_eq!(Route::from_subject("gdm", "gdm.unknown"), None);
        assert_eq!(Route::from_subject("gdm", "gdmpredict"), None);
        assert_eq!(Route::from_subject("gdm", "other.predict"), None);
        for route in Route::ALL {
            assert_eq!(Route::from_subject("gdm", &route.subject("gdm")), Some(route));
        }
    }

    #[tokio::test]
    async fn test_degraded_predict_reports_model_not_loaded() {
        let ctx = degraded();
        let err = ctx.predict(PatientData::low_risk_sample()).await.unwrap_err();
        assert!(matches!(err, ServiceError::ModelNotLoaded));
        assert_eq!(err.to_string(), "Model not loaded");
        assert!(ctx.model_info().is_err());
    }

    #[test]
    fn test_degraded_health() {
        let health = degraded().health();
        assert_eq!(health.status, HealthStatus::Degraded);
        assert!(!health.model_loaded);
        assert!(health.error.unwrap().contains("model_metadata.json"));
    }

    #[tokio::test]
    async fn test_validation_runs_before_model_check() {
        let ctx = degraded();
        let mut patient = PatientData::low_risk_sample();
        patient.dia_bp = 120.0;

        let err = ctx.predict(patient).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn test_handle_encodes_errors() {
        let ctx = degraded();

        let reply: Value = serde_json::from_slice(&ctx.handle(Route::Predict, b"{not json").await).unwrap();
        assert_eq!(reply["error"], "bad_request");

        let reply: Value = serde_json::from_slice(&ctx.handle(Route::Predict, br#"{"Age": 30}"#).await).unwrap();
        assert_eq!(reply["error"], "validation_failure");

        let reply: Value = serde_json::from_slice(&ctx.handle(Route::TestHighRisk, b"").await).unwrap();
        assert_eq!(reply["status"], 503);
        assert_eq!(reply["detail"], "Model not loaded");

        let reply: Value = serde_json::from_slice(&ctx.handle(Route::Health, b"").await).unwrap();
        assert_eq!(reply["status"], "degraded");

        assert_eq!(ctx.metrics().rejections.load(Ordering::Relaxed), 2);
        assert_eq!(ctx.metrics().failures.load(Ordering::Relaxed), 1);
    }

    /// Base model that stalls on its first call only.
    struct Stalling {
        stalled: AtomicBool,
        delay: Duration,
    }

    impl Classifier for Stalling {
        fn name(&self) -> &str {
            "Stalling"
        }

        fn predict(&self, x: &FeatureMatrix) -> Result<Vec<f64>, ModelError> {
            if !self.stalled.swap(true, Ordering::SeqCst) {
                std::thread::sleep(self.delay);
            }
            Ok(vec![1.0; x.n_rows()])
        }

        fn predict_proba(&self, x: &FeatureMatrix) -> Result<Vec<[f64; 2]>, ModelError> {
            self.predict(x).map(|p| p.into_iter().map(|v| [1.0 - v, v]).collect())
        }
    }

    fn stalling_bundle(delay: Duration) -> LoadedBundle {
        let models: ModelSet = vec![
            Box::new(Stalling {
                stalled: AtomicBool::new(false),
                delay,
            }) as Box<dyn Classifier>,
            Box::new(LinearModel::new(ENSEMBLE_MODEL, LinearKind::Logistic, vec![2.0], -1.0)),
        ]
        .into_iter()
        .collect();

        LoadedBundle {
            bundle: serde_json::from_value(json!({
                "version": "stall",
                "problem_type": "classification",
                "feature_columns": ["Age"],
                "saved_models": {"Stalling": "stall.json", "Ensemble": "meta.json"}
            }))
            .unwrap(),
            preprocessing: serde_json::from_value(json!({
                "feature_columns": ["Age"],
                "scaler": {"center": [0.0], "scale": [1.0]}
            }))
            .unwrap(),
            models,
        }
    }

    #[tokio::test]
    async fn test_timeout_fails_only_that_request() {
        let ctx = ServiceContext::new(
            ModelState::Loaded(Arc::new(stalling_bundle(Duration::from_millis(300)))),
            PipelineOptions::extended(),
            Duration::from_millis(10),
            Arc::new(PipelineMetrics::new()),
        );

        let reply: Value = serde_json::from_slice(&ctx.handle(Route::TestLowRisk, b"").await).unwrap();
        assert_eq!(reply["error"], "prediction_failed");
        assert_eq!(reply["status"], 500);
        assert!(reply["detail"].as_str().unwrap().contains("timed out"));
        assert_eq!(ctx.metrics().failures.load(Ordering::Relaxed), 1);

        // Let the stalled worker finish so the next run is not starved
        tokio::time::sleep(Duration::from_millis(400)).await;

        let reply: Value = serde_json::from_slice(&ctx.handle(Route::TestLowRisk, b"").await).unwrap();
        assert_eq!(reply["success"], true);
        assert_eq!(reply["prediction"], "GDM");
        assert_eq!(ctx.metrics().failures.load(Ordering::Relaxed), 1);
        assert_eq!(ctx.metrics().predictions.load(Ordering::Relaxed), 1);
    }
}
