// Decision model traits - Seam between classifier and model artifacts
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::errors::ModelLoadError;
use crate::domain::label::ClassCount;

/// Supported model families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ModelKind {
    #[default]
    #[serde(rename = "xgb")]
    GradientBoosted,
    #[serde(rename = "rf")]
    RandomForest,
}

impl ModelKind {
    pub fn artifact_file(self, classes: ClassCount) -> &'static str {
        match (self, classes) {
            (ModelKind::GradientBoosted, ClassCount::Ternary) => "xgboost_model.json",
            (ModelKind::GradientBoosted, ClassCount::Binary) => "xgboost_binary_model.json",
            (ModelKind::RandomForest, ClassCount::Ternary) => "random_forest_model.json",
            (ModelKind::RandomForest, ClassCount::Binary) => "random_forest_binary_model.json",
        }
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelKind::GradientBoosted => f.write_str("xgb"),
            ModelKind::RandomForest => f.write_str("rf"),
        }
    }
}

/// A trained classifier, read-only once loaded.
pub trait DecisionModel: Send + Sync {
    fn num_features(&self) -> usize;

    fn num_classes(&self) -> usize;

    /// Class index for one feature row. `features.len()` equals `num_features()`.
    fn predict_class(&self, features: &[f64]) -> usize;
}

/// Where model artifacts come from.
pub trait ModelSource: Send + Sync {
    fn load(
        &self,
        kind: ModelKind,
        classes: ClassCount,
    ) -> Result<Arc<dyn DecisionModel>, ModelLoadError>;
}
