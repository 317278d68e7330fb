//! Model bundle loader

use crate::error::ArtifactError;
use crate::models::bundle::{LoadedBundle, ModelBundle, METADATA_FILE, PREPROCESSING_FILE};
use crate::models::classifier::{Classifier, ModelSet, ENSEMBLE_MODEL};
use crate::models::linear::LinearModel;
use crate::models::onnx::OnnxClassifier;
use crate::preprocessing::PreprocessingState;
use serde::de::DeserializeOwned;
use std::path::Path;
use tracing::{info, warn};

/// Loads a bundle directory: descriptor, then preprocessing state, then
/// every model the descriptor names.
#[derive(Debug, Clone)]
pub struct BundleLoader {
    /// Number of threads for ONNX inference per model
    onnx_threads: usize,
}

impl BundleLoader {
    pub fn new() -> Self {
        Self::with_threads(1)
    }

    pub fn with_threads(onnx_threads: usize) -> Self {
        Self {
            onnx_threads: onnx_threads.max(1),
        }
    }

    /// Load a complete bundle from `dir`.
    pub fn load<P: AsRef<Path>>(&self, dir: P) -> Result<LoadedBundle, ArtifactError> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(ArtifactError::Missing {
                path: dir.to_path_buf(),
            });
        }

        let bundle: ModelBundle = read_json(&dir.join(METADATA_FILE))?;
        info!(
            version = %bundle.version,
            problem_type = ?bundle.problem_type,
            features = bundle.feature_columns.len(),
            "Loaded bundle descriptor"
        );

        let preprocessing_path = dir.join(PREPROCESSING_FILE);
        let preprocessing: PreprocessingState = read_json(&preprocessing_path)?;
        preprocessing
            .check()
            .map_err(|reason| ArtifactError::corrupt(&preprocessing_path, reason))?;
        if preprocessing.feature_columns != bundle.feature_columns {
            return Err(ArtifactError::corrupt(
                &preprocessing_path,
                "feature_columns differ from model_metadata.json",
            ));
        }

        let mut models = ModelSet::new();
        for (name, filename) in &bundle.saved_models {
            let model = self.load_model(name, &dir.join(filename))?;
            models.insert(model);
        }

        // An incomplete model set still loads; prediction reports it per request
        if models.ensemble().is_none() {
            warn!("Bundle descriptor names no {} meta-model", ENSEMBLE_MODEL);
        }
        if models.base_model_count() == 0 {
            warn!("Bundle descriptor names no base models");
        }

        info!(
            count = models.len(),
            models = ?models.names(),
            "Loaded {} models from {}",
            models.len(),
            dir.display()
        );

        Ok(LoadedBundle {
            bundle,
            preprocessing,
            models,
        })
    }

    /// Load one model, picking the backend from the file extension.
    pub fn load_model(&self, name: &str, path: &Path) -> Result<Box<dyn Classifier>, ArtifactError> {
        if !path.is_file() {
            return Err(ArtifactError::Missing {
                path: path.to_path_buf(),
            });
        }

        match path.extension().and_then(|e| e.to_str()) {
            Some("onnx") => {
                let model = OnnxClassifier::load(name, path, self.onnx_threads)
                    .map_err(|e| ArtifactError::corrupt(path, e))?;
                Ok(Box::new(model))
            }
            Some("json") => {
                let bytes = read_bytes(path)?;
                let model = LinearModel::from_json(name, &bytes)
                    .map_err(|e| ArtifactError::corrupt(path, e))?;
                info!(model = %name, kind = ?model.kind, "Loaded linear model");
                Ok(Box::new(model))
            }
            other => Err(ArtifactError::corrupt(
                path,
                format!("unsupported model format {:?}", other.unwrap_or("")),
            )),
        }
    }
}

impl Default for BundleLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn read_bytes(path: &Path) -> Result<Vec<u8>, ArtifactError> {
    std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ArtifactError::Missing {
            path: path.to_path_buf(),
        },
        _ => ArtifactError::corrupt(path, e),
    })
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ArtifactError> {
    let bytes = read_bytes(path)?;
    serde_json::from_slice(&bytes).map_err(|e| ArtifactError::corrupt(path, e))
}
