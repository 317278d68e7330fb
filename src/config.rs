//! Configuration management for the inference service

use crate::pipeline::{PipelineOptions, PipelineVariant};
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub nats: NatsConfig,
    pub models: ModelsConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

/// NATS connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct NatsConfig {
    /// NATS server URL
    pub url: String,
    /// Request subjects live under `<subject_prefix>.`
    #[serde(default = "default_subject_prefix")]
    pub subject_prefix: String,
}

fn default_subject_prefix() -> String {
    "gdm".to_string()
}

/// Model bundle configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    /// Directory holding model_metadata.json, preprocessing.json and models
    pub bundle_dir: String,
    /// Number of threads for ONNX inference per model (default: 1)
    #[serde(default = "default_onnx_threads")]
    pub onnx_threads: usize,
}

fn default_onnx_threads() -> usize {
    1
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub variant: PipelineVariant,
    /// Replaces the bundle's calibrated decision threshold
    #[serde(default)]
    pub threshold_override: Option<f64>,
    /// Attach clinical recommendations to extended outcomes
    #[serde(default = "default_recommendations")]
    pub recommendations: bool,
    /// Maximum requests processed concurrently
    pub workers: usize,
    /// Per-request processing timeout in milliseconds
    pub timeout_ms: u64,
}

fn default_recommendations() -> bool {
    true
}

impl PipelineConfig {
    /// Stage switches for the configured variant.
    pub fn options(&self) -> PipelineOptions {
        let options = PipelineOptions::for_variant(self.variant)
            .with_threshold_override(self.threshold_override);
        match self.variant {
            PipelineVariant::Extended => options.with_recommendations(self.recommendations),
            PipelineVariant::Legacy => options,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/config.toml")
    }

    /// Load configuration from a specific path, then apply `GDM__SECTION__KEY`
    /// environment overrides.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(
                Environment::with_prefix("GDM")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<()> {
        if let Some(t) = self.pipeline.threshold_override {
            anyhow::ensure!(
                (0.0..=1.0).contains(&t),
                "pipeline.threshold_override must be within [0, 1], got {}",
                t
            );
        }
        anyhow::ensure!(self.pipeline.workers > 0, "pipeline.workers must be positive");
        anyhow::ensure!(
            self.pipeline.timeout_ms > 0,
            "pipeline.timeout_ms must be positive"
        );
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            nats: NatsConfig {
                url: "nats://localhost:4222".to_string(),
                subject_prefix: default_subject_prefix(),
            },
            models: ModelsConfig {
                bundle_dir: "latest".to_string(),
                onnx_threads: 1,
            },
            pipeline: PipelineConfig {
                variant: PipelineVariant::Extended,
                threshold_override: None,
                recommendations: true,
                workers: 8,
                timeout_ms: 2000,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::RiskPolicy;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.nats.url, "nats://localhost:4222");
        assert_eq!(config.nats.subject_prefix, "gdm");
        assert_eq!(config.models.bundle_dir, "latest");
        assert_eq!(config.pipeline.variant, PipelineVariant::Extended);
        assert_eq!(config.pipeline.options(), PipelineOptions::extended());
    }

    #[test]
    fn test_load_legacy_variant_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
[nats]
url = "nats://nats:4222"

[models]
bundle_dir = "/srv/bundles/v4"

[pipeline]
variant = "legacy"
threshold_override = 0.35
workers = 2
timeout_ms = 500

[logging]
level = "debug"
format = "json"
"#
        )
        .unwrap();

        let config = AppConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.nats.subject_prefix, "gdm");
        assert_eq!(config.models.onnx_threads, 1);

        let options = config.pipeline.options();
        assert_eq!(options.policy, RiskPolicy::Simple);
        assert!(!options.feature_engineering);
        assert!(!options.recommendations);
        assert_eq!(options.threshold_override, Some(0.35));
    }

    #[test]
    fn test_out_of_range_threshold_is_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
[nats]
url = "nats://localhost:4222"
[models]
bundle_dir = "latest"
[pipeline]
threshold_override = 1.5
workers = 1
timeout_ms = 100
[logging]
level = "info"
format = "pretty"
"#
        )
        .unwrap();

        assert!(AppConfig::load_from_path(file.path()).is_err());
    }
}
