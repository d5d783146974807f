// HTTP request handlers
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::domain::errors::PredictionError;
use crate::domain::features::VitalsFeatures;
use crate::domain::label::BatchOutcome;
use crate::presentation::app_state::AppState;
use crate::presentation::event_stream::stream_from_broadcast;
use crate::presentation::host::CurrentPatient;

#[derive(Debug, Deserialize)]
pub struct SelectPatient {
    pub patient_id: String,
    pub age: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct ListenerStatus {
    pub running: bool,
    pub local_addr: Option<String>,
    pub cached_vectors: usize,
    pub cache_capacity: usize,
    pub model_loaded: bool,
    pub patient: Option<CurrentPatient>,
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn get_session(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.patients.current() {
        Some(patient) => Json(patient).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

pub async fn select_patient(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SelectPatient>,
) -> Response {
    if body.patient_id.trim().is_empty() {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": "patient_id must not be empty" })),
        )
            .into_response();
    }
    Json(state.patients.select(body.patient_id, body.age)).into_response()
}

/// Majority vote over the cached vectors. The outcome is also published as an event.
pub async fn predict_batch(State(state): State<Arc<AppState>>) -> Response {
    match state.prediction_service.run_batch().await {
        Ok(BatchOutcome::Label(label)) => Json(json!({
            "status": "ready",
            "label": label.as_str(),
            "suggested_action": label.suggested_action(),
        }))
        .into_response(),
        Ok(BatchOutcome::NoData) => Json(json!({ "status": "no_data" })).into_response(),
        Err(e) => prediction_error(e),
    }
}

pub async fn predict_one(
    State(state): State<Arc<AppState>>,
    Json(features): Json<VitalsFeatures>,
) -> Response {
    let layout = state.prediction_service.classifier().settings().layout;
    match state.prediction_service.run_single(features.to_vector(layout)).await {
        Ok(label) => Json(json!({
            "label": label.as_str(),
            "suggested_action": label.suggested_action(),
        }))
        .into_response(),
        Err(e) => prediction_error(e),
    }
}

fn prediction_error(e: PredictionError) -> Response {
    let status = match &e {
        PredictionError::Contract(_) => StatusCode::UNPROCESSABLE_ENTITY,
        PredictionError::ModelLoad(_) => StatusCode::SERVICE_UNAVAILABLE,
        PredictionError::UnknownClass(_) | PredictionError::Task(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    tracing::warn!(error = %e, %status, "prediction request failed");
    (
        status,
        Json(json!({ "status": "unavailable", "error": e.to_string() })),
    )
        .into_response()
}

pub async fn listener_status(State(state): State<Arc<AppState>>) -> Json<ListenerStatus> {
    let classifier = state.prediction_service.classifier();
    Json(ListenerStatus {
        running: state.listener.is_running(),
        local_addr: state.listener.local_addr().map(|a| a.to_string()),
        cached_vectors: classifier.cache().len(),
        cache_capacity: classifier.cache().capacity(),
        model_loaded: classifier.is_loaded(),
        patient: state.patients.current(),
    })
}

/// Stream monitor events as NDJSON until the client disconnects
pub async fn stream_events(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    stream_from_broadcast(state.events.subscribe())
}
