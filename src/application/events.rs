// Monitor events - Channel from ingestion to the host application
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::domain::session::SessionId;
use crate::domain::vitals::VitalsRecord;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MonitorEvent {
    VitalsUpdate {
        session: SessionId,
        record: VitalsRecord,
        ppv: Option<String>,
    },
    PredictionReady {
        label: String,
        suggested_action: String,
    },
    PredictionUnavailable {
        reason: String,
    },
}

/// Receives decoded vitals and predictions. Called only from the dispatcher task.
#[async_trait]
pub trait MonitorHost: Send + Sync {
    async fn on_vitals_update(&self, session: SessionId, record: VitalsRecord, ppv: Option<String>);

    async fn on_prediction_ready(&self, label: String, suggested_action: String);

    async fn on_prediction_unavailable(&self, reason: String) {
        tracing::info!(%reason, "prediction unavailable");
    }
}

/// Supplies the current patient context to ingestion.
pub trait PatientContext: Send + Sync {
    fn current_session_id(&self) -> SessionId;

    fn current_patient_age(&self) -> Option<f64> {
        None
    }
}

/// Non-blocking publisher side of the event channel.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<MonitorEvent>,
}

impl EventSender {
    /// Drops the event when the consumer is behind or gone; ingestion never waits on the host.
    pub fn publish(&self, event: MonitorEvent) {
        if let Err(e) = self.tx.try_send(event) {
            match e {
                mpsc::error::TrySendError::Full(_) => {
                    tracing::warn!("monitor event channel full, dropping event")
                }
                mpsc::error::TrySendError::Closed(_) => {
                    tracing::debug!("monitor event channel closed, dropping event")
                }
            }
        }
    }
}

pub fn event_channel(capacity: usize) -> (EventSender, mpsc::Receiver<MonitorEvent>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EventSender { tx }, rx)
}

/// Single consumer forwarding events to the host until every sender is dropped.
pub async fn run_dispatcher(mut rx: mpsc::Receiver<MonitorEvent>, host: Arc<dyn MonitorHost>) {
    while let Some(event) = rx.recv().await {
        match event {
            MonitorEvent::VitalsUpdate {
                session,
                record,
                ppv,
            } => host.on_vitals_update(session, record, ppv).await,
            MonitorEvent::PredictionReady {
                label,
                suggested_action,
            } => host.on_prediction_ready(label, suggested_action).await,
            MonitorEvent::PredictionUnavailable { reason } => {
                host.on_prediction_unavailable(reason).await
            }
        }
    }
    tracing::debug!("monitor event dispatcher stopped");
}
