//! Classifier abstraction shared by the native and ONNX model backends.

use crate::error::ModelError;
use crate::types::features::FeatureMatrix;

/// Name of the meta-model entry in every bundle.
pub const ENSEMBLE_MODEL: &str = "Ensemble";

/// A trained model usable as a base learner or as the stacking meta-model.
pub trait Classifier: Send + Sync {
    /// Model name as declared in the bundle descriptor.
    fn name(&self) -> &str;

    /// One predicted value per input row: the class (0/1) for classifiers,
    /// the raw output for regressors.
    fn predict(&self, x: &FeatureMatrix) -> Result<Vec<f64>, ModelError>;

    /// `[P(class 0), P(class 1)]` per row.
    ///
    /// Models without a probability output return
    /// [`ModelError::ProbabilityUnsupported`].
    fn predict_proba(&self, x: &FeatureMatrix) -> Result<Vec<[f64; 2]>, ModelError>;
}

/// Named models of one bundle, in descriptor order.
#[derive(Default)]
pub struct ModelSet {
    models: Vec<Box<dyn Classifier>>,
}

impl ModelSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, model: Box<dyn Classifier>) {
        self.models.retain(|m| m.name() != model.name());
        self.models.push(model);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Classifier> {
        self.models
            .iter()
            .find(|m| m.name() == name)
            .map(|m| m.as_ref())
    }

    /// The stacking meta-model.
    pub fn ensemble(&self) -> Option<&dyn Classifier> {
        self.get(ENSEMBLE_MODEL)
    }

    /// Every model except the meta-model, in descriptor order.
    pub fn base_models(&self) -> impl Iterator<Item = &dyn Classifier> {
        self.models
            .iter()
            .filter(|m| m.name() != ENSEMBLE_MODEL)
            .map(|m| m.as_ref())
    }

    pub fn base_model_count(&self) -> usize {
        self.base_models().count()
    }

    pub fn names(&self) -> Vec<String> {
        self.models.iter().map(|m| m.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

impl FromIterator<Box<dyn Classifier>> for ModelSet {
    fn from_iter<I: IntoIterator<Item = Box<dyn Classifier>>>(iter: I) -> Self {
        let mut set = ModelSet::new();
        for model in iter {
            set.insert(model);
        }
        set
    }
}

impl std::fmt::Debug for ModelSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelSet")
            .field("models", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::linear::{LinearKind, LinearModel};

    fn model(name: &str) -> Box<dyn Classifier> {
        Box::new(LinearModel::new(name, LinearKind::Logistic, vec![1.0], 0.0))
    }

    #[test]
    fn test_base_models_exclude_ensemble_and_keep_order() {
        let set: ModelSet = vec![model("SVM"), model(ENSEMBLE_MODEL), model("RandomForest")]
            .into_iter()
            .collect();

        let bases: Vec<_> = set.base_models().map(|m| m.name().to_string()).collect();
        assert_eq!(bases, vec!["SVM", "RandomForest"]);
        assert!(set.ensemble().is_some());
        assert_eq!(set.len(), 3);
        assert_eq!(set.base_model_count(), 2);
    }

    #[test]
    fn test_insert_replaces_same_name() {
        let mut set = ModelSet::new();
        set.insert(model("SVM"));
        set.insert(model("SVM"));
        assert_eq!(set.names(), vec!["SVM"]);
        assert!(set.ensemble().is_none());
        assert_eq!(set.base_model_count(), 1);
    }
}
