// Model store - Loads classifier artifacts from the model directory
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::application::decision_model::{DecisionModel, ModelKind, ModelSource};
use crate::domain::errors::ModelLoadError;
use crate::domain::label::ClassCount;
use crate::infrastructure::forest_model::RandomForestModel;
use crate::infrastructure::xgboost_model::XgboostModel;

#[derive(Debug, Clone)]
pub struct ModelStore {
    dir: PathBuf,
}

impl ModelStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn artifact_path(&self, kind: ModelKind, classes: ClassCount) -> PathBuf {
        self.dir.join(kind.artifact_file(classes))
    }
}

impl ModelSource for ModelStore {
    fn load(
        &self,
        kind: ModelKind,
        classes: ClassCount,
    ) -> Result<Arc<dyn DecisionModel>, ModelLoadError> {
        let path = self.artifact_path(kind, classes);
        tracing::info!(path = %path.display(), %kind, "loading classifier model");

        if !path.exists() {
            return Err(ModelLoadError::NotFound(path));
        }
        let json = std::fs::read_to_string(&path).map_err(|source| ModelLoadError::Io {
            path: path.clone(),
            source,
        })?;

        let parsed = match kind {
            ModelKind::GradientBoosted => {
                XgboostModel::from_json(&json).map(|m| Arc::new(m) as Arc<dyn DecisionModel>)
            }
            ModelKind::RandomForest => {
                RandomForestModel::from_json(&json).map(|m| Arc::new(m) as Arc<dyn DecisionModel>)
            }
        };

        parsed.map_err(|source| ModelLoadError::Parse { path, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::forest_model::tests::TERNARY_FOREST;
    use crate::infrastructure::xgboost_model::tests::TERNARY_MODEL;

    #[test]
    fn test_missing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path());

        let err = store
            .load(ModelKind::GradientBoosted, ClassCount::Binary)
            .err()
            .unwrap();
        match err {
            ModelLoadError::NotFound(path) => {
                assert!(path.ends_with("xgboost_binary_model.json"))
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_loads_each_kind() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("xgboost_model.json"), TERNARY_MODEL).unwrap();
        std::fs::write(dir.path().join("random_forest_model.json"), TERNARY_FOREST).unwrap();
        let store = ModelStore::new(dir.path());

        for kind in [ModelKind::GradientBoosted, ModelKind::RandomForest] {
            let model = store.load(kind, ClassCount::Ternary).unwrap();
            assert_eq!(model.num_features(), 7);
            assert_eq!(model.num_classes(), 3);
        }
    }

    #[test]
    fn test_corrupt_artifact() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("random_forest_model.json"), "{not json").unwrap();
        let store = ModelStore::new(dir.path());

        assert!(matches!(
            store.load(ModelKind::RandomForest, ClassCount::Ternary),
            Err(ModelLoadError::Parse { .. })
        ));
    }
}
