//! Type definitions for the inference service

pub mod features;
pub mod patient;
pub mod prediction;
pub mod response;

pub use features::{EnhancedRecord, FeatureMatrix, FeatureValue};
pub use patient::{PatientData, PatientInput, PatientRecord};
pub use prediction::{Label, PredictionOutcome, RiskCategory};
pub use response::{ErrorResponse, HealthResponse, ModelInfoResponse, PredictionResponse};
