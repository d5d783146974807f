// Application state for HTTP handlers
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::application::events::MonitorEvent;
use crate::application::prediction_service::PredictionService;
use crate::infrastructure::listener::VitalsListener;
use crate::presentation::host::PatientRegistry;

#[derive(Clone)]
pub struct AppState {
    pub prediction_service: PredictionService,
    pub patients: Arc<PatientRegistry>,
    pub events: broadcast::Sender<MonitorEvent>,
    pub listener: Arc<VitalsListener>,
}
