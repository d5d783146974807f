// Prediction service - Operator-triggered classification use cases
use std::sync::Arc;

use crate::application::classifier::Classifier;
use crate::application::events::{EventSender, MonitorEvent};
use crate::domain::errors::PredictionError;
use crate::domain::features::FeatureVector;
use crate::domain::label::{BatchOutcome, Label};

#[derive(Clone)]
pub struct PredictionService {
    classifier: Arc<Classifier>,
    events: EventSender,
}

impl PredictionService {
    pub fn new(classifier: Arc<Classifier>, events: EventSender) -> Self {
        Self { classifier, events }
    }

    pub fn classifier(&self) -> &Arc<Classifier> {
        &self.classifier
    }

    /// Runs the majority vote off the async runtime and notifies the host of the outcome.
    pub async fn run_batch(&self) -> Result<BatchOutcome, PredictionError> {
        let classifier = self.classifier.clone();
        let outcome = tokio::task::spawn_blocking(move || classifier.predict_batch())
            .await
            .map_err(|e| PredictionError::Task(e.to_string()))
            .and_then(|result| result);

        match &outcome {
            Ok(BatchOutcome::Label(label)) => self.events.publish(MonitorEvent::PredictionReady {
                label: label.as_str().to_string(),
                suggested_action: label.suggested_action().to_string(),
            }),
            Ok(BatchOutcome::NoData) => self.events.publish(MonitorEvent::PredictionUnavailable {
                reason: "no data".to_string(),
            }),
            Err(e) => {
                tracing::warn!(error = %e, "batch prediction failed");
                self.events.publish(MonitorEvent::PredictionUnavailable {
                    reason: e.to_string(),
                });
            }
        }

        outcome
    }

    pub async fn run_single(&self, vector: FeatureVector) -> Result<Label, PredictionError> {
        let classifier = self.classifier.clone();
        tokio::task::spawn_blocking(move || classifier.predict_one(&vector))
            .await
            .map_err(|e| PredictionError::Task(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::classifier::ClassifierSettings;
    use crate::application::decision_model::{DecisionModel, ModelKind, ModelSource};
    use crate::application::events::event_channel;
    use crate::application::inference_cache::InferenceCache;
    use crate::domain::errors::ModelLoadError;
    use crate::domain::features::FeatureLayout;
    use crate::domain::label::ClassCount;

    /// Always answers hypovolemia.
    struct ConstantModel;

    impl DecisionModel for ConstantModel {
        fn num_features(&self) -> usize {
            7
        }

        fn num_classes(&self) -> usize {
            3
        }

        fn predict_class(&self, _features: &[f64]) -> usize {
            1
        }
    }

    struct Source(bool);

    impl ModelSource for Source {
        fn load(
            &self,
            _kind: ModelKind,
            _classes: ClassCount,
        ) -> Result<Arc<dyn DecisionModel>, ModelLoadError> {
            if self.0 {
                Ok(Arc::new(ConstantModel))
            } else {
                Err(ModelLoadError::NotFound("models/xgboost_model.json".into()))
            }
        }
    }

    fn zeros() -> FeatureVector {
        FeatureVector::new(FeatureLayout::Standard, vec![0.0; 7]).unwrap()
    }

    fn service(available: bool) -> (PredictionService, tokio::sync::mpsc::Receiver<MonitorEvent>) {
        let layout = FeatureLayout::Standard;
        let cache = Arc::new(InferenceCache::new(4, layout.width()));
        let classifier = Arc::new(Classifier::new(
            ClassifierSettings {
                kind: ModelKind::GradientBoosted,
                classes: ClassCount::Ternary,
                layout,
            },
            Arc::new(Source(available)),
            cache,
        ));
        let (events, rx) = event_channel(8);
        (PredictionService::new(classifier, events), rx)
    }

    #[tokio::test]
    async fn test_batch_publishes_ready() {
        let (service, mut rx) = service(true);
        service
            .classifier()
            .cache()
            .push(zeros())
            .unwrap();

        let outcome = service.run_batch().await.unwrap();
        assert_eq!(outcome, BatchOutcome::Label(Label::Hypovolemia));
        assert_eq!(
            rx.try_recv().unwrap(),
            MonitorEvent::PredictionReady {
                label: "hypovolemia".to_string(),
                suggested_action: "consider fluid administration".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_empty_batch_publishes_no_data() {
        let (service, mut rx) = service(true);

        assert_eq!(service.run_batch().await.unwrap(), BatchOutcome::NoData);
        assert_eq!(
            rx.try_recv().unwrap(),
            MonitorEvent::PredictionUnavailable {
                reason: "no data".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_missing_model_publishes_unavailable() {
        let (service, mut rx) = service(false);
        service
            .classifier()
            .cache()
            .push(zeros())
            .unwrap();

        assert!(matches!(
            service.run_batch().await,
            Err(PredictionError::ModelLoad(_))
        ));
        assert!(matches!(
            rx.try_recv().unwrap(),
            MonitorEvent::PredictionUnavailable { .. }
        ));
        assert!(service.run_single(zeros()).await.is_err());
    }
}
