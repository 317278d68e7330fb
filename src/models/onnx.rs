//! ONNX Runtime backed classifiers.
//!
//! Handles the two output layouts sklearn-onnx exporters produce: a
//! `[batch, classes]` probability tensor (SVM, random forest, XGBoost) and a
//! `seq(map(int64, float))` (LightGBM, CatBoost, logistic regression with
//! zipmap).

use crate::error::ModelError;
use crate::models::classifier::Classifier;
use crate::types::features::FeatureMatrix;
use ort::memory::Allocator;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::{DowncastableTarget, DynMapValueType, DynSequenceValueType, DynValue, Tensor};
use std::path::Path;
use std::sync::{Mutex, Once};
use tracing::{debug, info};

static ORT_INIT: Once = Once::new();

/// Initialize the ONNX Runtime environment once per process.
fn init_runtime() {
    ORT_INIT.call_once(|| {
        if let Err(e) = ort::init().commit() {
            tracing::warn!(error = %e, "ONNX Runtime environment init failed, using defaults");
        } else {
            info!("ONNX Runtime initialized");
        }
    });
}

/// Loaded ONNX session with its resolved input/output names.
pub struct OnnxClassifier {
    name: String,
    /// Sessions need exclusive access to run.
    session: Mutex<Session>,
    input_name: String,
    label_output: Option<String>,
    probability_output: Option<String>,
}

impl OnnxClassifier {
    /// Load a model file and resolve its input and output names.
    pub fn load<P: AsRef<Path>>(name: &str, path: P, threads: usize) -> Result<Self, ModelError> {
        init_runtime();
        let path = path.as_ref();
        let runtime_err = |e: ort::Error| ModelError::Runtime {
            model: name.to_string(),
            reason: e.to_string(),
        };

        info!(model = %name, path = %path.display(), threads = threads, "Loading ONNX model");

        let session = Session::builder()
            .map_err(runtime_err)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(runtime_err)?
            .with_intra_threads(threads)
            .map_err(runtime_err)?
            .commit_from_file(path)
            .map_err(runtime_err)?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "float_input".to_string());

        let label_output = session
            .outputs
            .iter()
            .find(|o| o.name.contains("label"))
            .map(|o| o.name.clone());

        let probability_output = session
            .outputs
            .iter()
            .find(|o| o.name.contains("prob"))
            .map(|o| o.name.clone());

        info!(
            model = %name,
            input = %input_name,
            label = ?label_output,
            probabilities = ?probability_output,
            "Model loaded successfully"
        );

        Ok(Self {
            name: name.to_string(),
            session: Mutex::new(session),
            input_name,
            label_output,
            probability_output,
        })
    }

    fn runtime_error(&self, reason: impl ToString) -> ModelError {
        ModelError::Runtime {
            model: self.name.clone(),
            reason: reason.to_string(),
        }
    }

    fn input_tensor(&self, x: &FeatureMatrix) -> Result<Tensor<f32>, ModelError> {
        let shape = vec![x.n_rows() as i64, x.n_cols() as i64];
        Tensor::from_array((shape, x.to_f32())).map_err(|e| self.runtime_error(e))
    }

    fn check_rows<T>(&self, values: Vec<T>, expected: usize) -> Result<Vec<T>, ModelError> {
        if values.len() != expected {
            return Err(ModelError::OutputLength {
                model: self.name.clone(),
                expected,
                actual: values.len(),
            });
        }
        Ok(values)
    }

    fn extract_labels(&self, output: &DynValue) -> Result<Vec<f64>, ModelError> {
        if let Ok((_, data)) = output.try_extract_tensor::<i64>() {
            return Ok(data.iter().map(|&v| v as f64).collect());
        }
        if let Ok((_, data)) = output.try_extract_tensor::<f32>() {
            return Ok(data.iter().map(|&v| v as f64).collect());
        }
        Err(self.runtime_error("label output is neither int64 nor float tensor"))
    }

    fn extract_probabilities(&self, output: &DynValue) -> Result<Vec<[f64; 2]>, ModelError> {
        if let Ok((shape, data)) = output.try_extract_tensor::<f32>() {
            let dims: Vec<i64> = shape.iter().copied().collect();
            let classes = dims.last().copied().unwrap_or(1).max(1) as usize;
            let probs = data
                .chunks(classes)
                .map(|row| match row {
                    [p0, p1, ..] => [*p0 as f64, *p1 as f64],
                    [p1] => [1.0 - *p1 as f64, *p1 as f64],
                    [] => [1.0, 0.0],
                })
                .collect();
            debug!(model = %self.name, "Extracted probabilities from tensor");
            return Ok(probs);
        }

        if DynSequenceValueType::can_downcast(&output.dtype()) {
            return self.extract_from_sequence_map(output);
        }

        Err(self.runtime_error("unsupported probability output type"))
    }

    /// Extract per-row probabilities from `seq(map(int64, float))`.
    fn extract_from_sequence_map(&self, output: &DynValue) -> Result<Vec<[f64; 2]>, ModelError> {
        let allocator = Allocator::default();

        let sequence = output
            .downcast_ref::<DynSequenceValueType>()
            .map_err(|e| self.runtime_error(format!("failed to downcast to sequence: {}", e)))?;

        let maps = sequence
            .try_extract_sequence::<DynMapValueType>(&allocator)
            .map_err(|e| self.runtime_error(e))?;

        maps.iter()
            .map(|map_value| {
                let kv_pairs = map_value
                    .try_extract_key_values::<i64, f32>()
                    .map_err(|e| self.runtime_error(e))?;

                let class_prob = |class: i64| {
                    kv_pairs
                        .iter()
                        .find(|(id, _)| *id == class)
                        .map(|(_, p)| *p as f64)
                };
                match (class_prob(0), class_prob(1)) {
                    (_, Some(p1)) => Ok([1.0 - p1, p1]),
                    (Some(p0), None) => Ok([p0, 1.0 - p0]),
                    (None, None) => Err(self.runtime_error("no class probability in map")),
                }
            })
            .collect()
    }
}

impl Classifier for OnnxClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn predict(&self, x: &FeatureMatrix) -> Result<Vec<f64>, ModelError> {
        let input = self.input_tensor(x)?;
        let mut session = self.session.lock().map_err(|_| ModelError::Poisoned {
            model: self.name.clone(),
        })?;
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input])
            .map_err(|e| self.runtime_error(e))?;

        let labels = if let Some(output) = self.label_output.as_deref().and_then(|n| outputs.get(n)) {
            self.extract_labels(output)?
        } else {
            // No label output: take the arg-max of the probabilities
            let output = self
                .probability_output
                .as_deref()
                .and_then(|n| outputs.get(n))
                .ok_or_else(|| self.runtime_error("model has neither label nor probability output"))?;
            self.extract_probabilities(output)?
                .into_iter()
                .map(|[p0, p1]| if p1 > p0 { 1.0 } else { 0.0 })
                .collect()
        };
        self.check_rows(labels, x.n_rows())
    }

    fn predict_proba(&self, x: &FeatureMatrix) -> Result<Vec<[f64; 2]>, ModelError> {
        let Some(output_name) = self.probability_output.as_deref() else {
            return Err(ModelError::ProbabilityUnsupported {
                model: self.name.clone(),
            });
        };

        let input = self.input_tensor(x)?;
        let mut session = self.session.lock().map_err(|_| ModelError::Poisoned {
            model: self.name.clone(),
        })?;
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input])
            .map_err(|e| self.runtime_error(e))?;

        let output = outputs
            .get(output_name)
            .ok_or_else(|| self.runtime_error(format!("missing output {}", output_name)))?;
        let probs = self.extract_probabilities(output)?;
        self.check_rows(probs, x.n_rows())
    }
}
