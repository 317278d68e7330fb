//! Error types for artifact loading, model evaluation, the inference pipeline
//! and the request surface.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Failures while reading a model bundle from disk.
///
/// These are never fatal to the process: the service starts in degraded mode.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact missing: {}", .path.display())]
    Missing { path: PathBuf },

    #[error("artifact corrupt: {}: {reason}", .path.display())]
    Corrupt { path: PathBuf, reason: String },
}

impl ArtifactError {
    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Corrupt {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Failures raised by a single classifier.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model {model} exposes no probability output")]
    ProbabilityUnsupported { model: String },

    #[error("model {model} expected {expected} features, got {actual}")]
    ShapeMismatch {
        model: String,
        expected: usize,
        actual: usize,
    },

    #[error("model {model} returned {actual} rows for {expected} inputs")]
    OutputLength {
        model: String,
        expected: usize,
        actual: usize,
    },

    #[error("onnx runtime error in {model}: {reason}")]
    Runtime { model: String, reason: String },

    #[error("session lock poisoned for {model}")]
    Poisoned { model: String },
}

/// Failures that abort a single inference request.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Model not loaded")]
    ModelNotLoaded,

    #[error("No individual models available for prediction")]
    NoBaseModels,

    #[error("Ensemble meta-model missing from model set")]
    NoEnsembleModel,

    #[error("Ensemble prediction failed: {0}")]
    EnsembleFailed(#[source] ModelError),

    #[error("missing feature columns: {}", .0.join(", "))]
    MissingFeatures(Vec<String>),

    #[error("prediction timed out after {0} ms")]
    Timeout(u64),

    #[error("prediction worker failed: {0}")]
    Worker(String),
}

/// A single rejected request field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Request validation failure carrying every offending field.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("validation failed: {}", join_fields(.fields))]
pub struct ValidationError {
    pub fields: Vec<FieldError>,
}

impl ValidationError {
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            fields: vec![FieldError::new(field, message)],
        }
    }

    /// Prefix every field with a record position, used for batch input.
    pub fn at_row(self, row: usize) -> Self {
        Self {
            fields: self
                .fields
                .into_iter()
                .map(|f| FieldError::new(format!("[{}].{}", row, f.field), f.message))
                .collect(),
        }
    }
}

fn join_fields(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors surfaced to request callers.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Model not loaded")]
    ModelNotLoaded,

    #[error("Prediction failed: {0}")]
    Prediction(#[source] PipelineError),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unknown route: {0}")]
    UnknownRoute(String),
}

impl ServiceError {
    /// Machine readable error kind used in reply payloads and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "validation_failure",
            ServiceError::ModelNotLoaded => "model_not_loaded",
            ServiceError::Prediction(_) => "prediction_failed",
            ServiceError::BadRequest(_) => "bad_request",
            ServiceError::UnknownRoute(_) => "unknown_route",
        }
    }

    /// HTTP-equivalent status code for callers bridging to HTTP.
    pub fn status(&self) -> u16 {
        match self {
            ServiceError::Validation(_) => 422,
            ServiceError::ModelNotLoaded => 503,
            ServiceError::Prediction(_) => 500,
            ServiceError::BadRequest(_) => 400,
            ServiceError::UnknownRoute(_) => 404,
        }
    }
}

impl From<PipelineError> for ServiceError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::ModelNotLoaded => ServiceError::ModelNotLoaded,
            other => ServiceError::Prediction(other),
        }
    }
}
