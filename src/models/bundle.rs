//! Versioned model bundle descriptor and the loaded in-memory bundle.

use crate::models::classifier::ModelSet;
use crate::preprocessing::PreprocessingState;
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

pub const METADATA_FILE: &str = "model_metadata.json";
pub const PREPROCESSING_FILE: &str = "preprocessing.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProblemType {
    Classification,
    Regression,
}

/// `model_metadata.json` as written by the training job.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModelBundle {
    pub version: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    pub problem_type: ProblemType,
    pub feature_columns: Vec<String>,
    /// Model name to artifact file, in the order the models were saved.
    /// Stacked base-model columns follow this order.
    #[serde(deserialize_with = "ordered_pairs")]
    pub saved_models: Vec<(String, String)>,
    #[serde(default)]
    pub score_metric: Option<String>,
    #[serde(default)]
    pub final_score: Option<f64>,
    #[serde(default)]
    pub best_model: Option<String>,
    #[serde(default)]
    pub best_f1: Option<f64>,
    #[serde(default)]
    pub best_accuracy: Option<f64>,
    #[serde(default)]
    pub best_precision: Option<f64>,
    #[serde(default)]
    pub best_recall: Option<f64>,
    #[serde(default)]
    pub critical_features: Option<Vec<String>>,
    #[serde(default)]
    pub fixes_applied: Vec<String>,
    #[serde(default)]
    pub validation: serde_json::Value,
}

impl ModelBundle {
    pub fn model_names(&self) -> Vec<String> {
        self.saved_models.iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn critical_features(&self) -> Vec<String> {
        self.critical_features
            .clone()
            .unwrap_or_else(|| vec!["BMI".to_string(), "OGTT".to_string()])
    }
}

/// Deserialize a JSON object into key/value pairs, keeping document order.
fn ordered_pairs<'de, D>(deserializer: D) -> Result<Vec<(String, String)>, D::Error>
where
    D: Deserializer<'de>,
{
    struct PairsVisitor;

    impl<'de> Visitor<'de> for PairsVisitor {
        type Value = Vec<(String, String)>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a map of model name to file name")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
            let mut pairs = Vec::with_capacity(access.size_hint().unwrap_or(0));
            while let Some((name, file)) = access.next_entry::<String, String>()? {
                pairs.push((name, file));
            }
            Ok(pairs)
        }
    }

    deserializer.deserialize_map(PairsVisitor)
}

/// Everything one request needs, loaded together and never mutated.
#[derive(Debug)]
pub struct LoadedBundle {
    pub bundle: ModelBundle,
    pub preprocessing: PreprocessingState,
    pub models: ModelSet,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_saved_models_keep_document_order() {
        let json = r#"{
            "version": "v3",
            "problem_type": "classification",
            "feature_columns": ["Age"],
            "saved_models": {"XGBoost": "xgb.onnx", "Ensemble": "meta.json", "KNN": "knn.onnx"}
        }"#;
        let bundle: ModelBundle = serde_json::from_str(json).unwrap();

        assert_eq!(bundle.model_names(), vec!["XGBoost", "Ensemble", "KNN"]);
        assert_eq!(bundle.critical_features(), vec!["BMI", "OGTT"]);
        assert!(bundle.fixes_applied.is_empty());
        assert!(bundle.validation.is_null());
    }
}
