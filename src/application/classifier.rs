// Classifier - Single and majority-vote prediction over the inference cache
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::application::decision_model::{DecisionModel, ModelKind, ModelSource};
use crate::application::inference_cache::InferenceCache;
use crate::domain::errors::{CacheContractError, ModelLoadError, PredictionError};
use crate::domain::features::{FeatureLayout, FeatureVector};
use crate::domain::label::{BatchOutcome, ClassCount, Label};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifierSettings {
    pub kind: ModelKind,
    pub classes: ClassCount,
    pub layout: FeatureLayout,
}

pub struct Classifier {
    settings: ClassifierSettings,
    source: Arc<dyn ModelSource>,
    cache: Arc<InferenceCache>,
    model: OnceCell<Arc<dyn DecisionModel>>,
}

impl Classifier {
    pub fn new(
        settings: ClassifierSettings,
        source: Arc<dyn ModelSource>,
        cache: Arc<InferenceCache>,
    ) -> Self {
        Self {
            settings,
            source,
            cache,
            model: OnceCell::new(),
        }
    }

    pub fn settings(&self) -> ClassifierSettings {
        self.settings
    }

    pub fn cache(&self) -> &Arc<InferenceCache> {
        &self.cache
    }

    pub fn is_loaded(&self) -> bool {
        self.model.get().is_some()
    }

    /// Loads the configured model once. Later calls are no-ops; a failure is returned, not retried.
    pub fn load(&self) -> Result<(), ModelLoadError> {
        self.model().map(|_| ())
    }

    fn model(&self) -> Result<&Arc<dyn DecisionModel>, ModelLoadError> {
        self.model.get_or_try_init(|| {
            let ClassifierSettings {
                kind,
                classes,
                layout,
            } = self.settings;
            let model = self.source.load(kind, classes)?;

            if model.num_features() != layout.width() {
                return Err(ModelLoadError::Invalid(format!(
                    "{kind} model expects {} features, layout {layout:?} has {}",
                    model.num_features(),
                    layout.width()
                )));
            }
            if model.num_classes() != classes.get() {
                return Err(ModelLoadError::Invalid(format!(
                    "{kind} model has {} classes, configured for {}",
                    model.num_classes(),
                    classes.get()
                )));
            }

            tracing::info!(%kind, classes = classes.get(), ?layout, "classifier model loaded");
            Ok(model)
        })
    }

    pub fn predict_one(&self, vector: &FeatureVector) -> Result<Label, PredictionError> {
        let model = self.model()?;
        if vector.len() != model.num_features() {
            return Err(CacheContractError::WidthMismatch {
                expected: model.num_features(),
                got: vector.len(),
            }
            .into());
        }

        let class = model.predict_class(vector.as_slice());
        Label::from_class(self.settings.classes, class).ok_or(PredictionError::UnknownClass(class))
    }

    /// Plurality label over the cached window; ties go to the label seen first.
    pub fn predict_batch(&self) -> Result<BatchOutcome, PredictionError> {
        let batch = self.cache.drain_for_batch();
        if batch.is_empty() {
            return Ok(BatchOutcome::NoData);
        }

        let mut tally: Vec<(Label, usize)> = Vec::new();
        for vector in &batch {
            let label = self.predict_one(vector)?;
            match tally.iter_mut().find(|(seen, _)| *seen == label) {
                Some((_, count)) => *count += 1,
                None => tally.push((label, 1)),
            }
        }

        tracing::debug!(batch = batch.len(), ?tally, "batch prediction tallied");

        let mut winner: Option<(Label, usize)> = None;
        for (label, count) in tally {
            if winner.is_none_or(|(_, best)| count > best) {
                winner = Some((label, count));
            }
        }

        Ok(winner.map_or(BatchOutcome::NoData, |(label, _)| BatchOutcome::Label(label)))
    }
}
