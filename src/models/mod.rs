//! Model bundle loading and stacked ensemble inference

pub mod bundle;
pub mod classifier;
pub mod ensemble;
pub mod linear;
pub mod loader;
pub mod onnx;

pub use bundle::{LoadedBundle, ModelBundle, ProblemType};
pub use classifier::{Classifier, ModelSet, ENSEMBLE_MODEL};
pub use ensemble::{EnsembleOutput, EnsemblePredictor};
pub use loader::BundleLoader;
