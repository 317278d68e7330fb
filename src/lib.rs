//! GDM Risk Inference Library
//!
//! Serves gestational diabetes risk predictions from a versioned bundle of
//! stacked classifiers: feature engineering, preprocessing, ensemble
//! inference and clinical risk interpretation.

pub mod audit;
pub mod config;
pub mod consumer;
pub mod error;
pub mod feature_engineering;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod preprocessing;
pub mod producer;
pub mod risk;
pub mod service;
pub mod types;

pub use config::AppConfig;
pub use consumer::RequestConsumer;
pub use models::loader::BundleLoader;
pub use pipeline::{InferencePipeline, PipelineOptions};
pub use producer::ReplyPublisher;
pub use service::ServiceContext;
pub use types::{patient::PatientData, prediction::PredictionOutcome};
