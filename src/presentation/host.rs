// In-process host collaborator - Current patient and event fan-out
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::application::events::{MonitorEvent, MonitorHost, PatientContext};
use crate::domain::session::SessionId;
use crate::domain::vitals::VitalsRecord;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentPatient {
    pub patient_id: String,
    pub age: Option<f64>,
    pub session: SessionId,
}

/// The "currently selected patient". Selecting a different patient opens a new session.
#[derive(Debug)]
pub struct PatientRegistry {
    current: RwLock<Option<CurrentPatient>>,
    next_session: AtomicU64,
}

impl Default for PatientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PatientRegistry {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(None),
            next_session: AtomicU64::new(SessionId::UNASSIGNED.0 + 1),
        }
    }

    pub fn current(&self) -> Option<CurrentPatient> {
        self.current.read().clone()
    }

    pub fn select(&self, patient_id: String, age: Option<f64>) -> CurrentPatient {
        let mut current = self.current.write();
        if let Some(existing) = current.as_mut().filter(|c| c.patient_id == patient_id) {
            existing.age = age.or(existing.age);
            return existing.clone();
        }

        let selected = CurrentPatient {
            patient_id,
            age,
            session: SessionId(self.next_session.fetch_add(1, Ordering::Relaxed)),
        };
        tracing::info!(patient = %selected.patient_id, session = %selected.session, "patient selected");
        *current = Some(selected.clone());
        selected
    }

    pub fn clear(&self) {
        if let Some(previous) = self.current.write().take() {
            tracing::info!(patient = %previous.patient_id, "patient deselected");
        }
    }
}

impl PatientContext for PatientRegistry {
    fn current_session_id(&self) -> SessionId {
        self.current
            .read()
            .as_ref()
            .map_or(SessionId::UNASSIGNED, |c| c.session)
    }

    fn current_patient_age(&self) -> Option<f64> {
        self.current.read().as_ref().and_then(|c| c.age)
    }
}

/// Re-publishes dispatched events to every `/events` subscriber.
#[derive(Debug, Clone)]
pub struct BroadcastHost {
    tx: broadcast::Sender<MonitorEvent>,
}

impl BroadcastHost {
    pub fn new(tx: broadcast::Sender<MonitorEvent>) -> Self {
        Self { tx }
    }

    fn forward(&self, event: MonitorEvent) {
        // no subscribers is fine
        let _ = self.tx.send(event);
    }
}

#[async_trait]
impl MonitorHost for BroadcastHost {
    async fn on_vitals_update(&self, session: SessionId, record: VitalsRecord, ppv: Option<String>) {
        self.forward(MonitorEvent::VitalsUpdate {
            session,
            record,
            ppv,
        });
    }

    async fn on_prediction_ready(&self, label: String, suggested_action: String) {
        tracing::info!(%label, %suggested_action, "prediction ready");
        self.forward(MonitorEvent::PredictionReady {
            label,
            suggested_action,
        });
    }

    async fn on_prediction_unavailable(&self, reason: String) {
        tracing::info!(%reason, "prediction unavailable");
        self.forward(MonitorEvent::PredictionUnavailable { reason });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_per_patient() {
        let registry = PatientRegistry::new();
        assert_eq!(registry.current_session_id(), SessionId::UNASSIGNED);

        let first = registry.select("MRN-1".to_string(), Some(45.0));
        assert_ne!(first.session, SessionId::UNASSIGNED);
        assert_eq!(registry.current_patient_age(), Some(45.0));

        let again = registry.select("MRN-1".to_string(), None);
        assert_eq!(again.session, first.session);
        assert_eq!(again.age, Some(45.0));

        let second = registry.select("MRN-2".to_string(), None);
        assert_ne!(second.session, first.session);
        assert_eq!(registry.current_session_id(), second.session);
        assert_eq!(registry.current_patient_age(), None);

        registry.clear();
        assert_eq!(registry.current_session_id(), SessionId::UNASSIGNED);
    }

    #[tokio::test]
    async fn test_broadcast_host_forwards() {
        let (tx, mut rx) = broadcast::channel(4);
        let host = BroadcastHost::new(tx);

        host.on_prediction_ready("euvolemia".to_string(), "maintain current status".to_string())
            .await;
        assert_eq!(
            rx.recv().await.unwrap(),
            MonitorEvent::PredictionReady {
                label: "euvolemia".to_string(),
                suggested_action: "maintain current status".to_string(),
            }
        );
    }
}
