// Main entry point - Dependency injection and server setup
use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use fluid_vitals::application::classifier::Classifier;
use fluid_vitals::application::events::{event_channel, run_dispatcher};
use fluid_vitals::application::inference_cache::InferenceCache;
use fluid_vitals::application::prediction_service::PredictionService;
use fluid_vitals::infrastructure::config::load_monitor_config;
use fluid_vitals::infrastructure::connection::ConnectionContext;
use fluid_vitals::infrastructure::listener::VitalsListener;
use fluid_vitals::infrastructure::model_store::ModelStore;
use fluid_vitals::presentation::app_state::AppState;
use fluid_vitals::presentation::handlers::{
    get_session, health_check, listener_status, predict_batch, predict_one, select_patient,
    stream_events,
};
use fluid_vitals::presentation::host::{BroadcastHost, PatientRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = load_monitor_config()?;
    let classifier_settings = config.classifier.settings();
    let layout = classifier_settings.layout;

    // Shared ingestion state (application layer)
    let cache = Arc::new(InferenceCache::new(
        config.classifier.cache_capacity,
        layout.width(),
    ));
    let model_store = Arc::new(ModelStore::new(config.classifier.model_dir.clone()));
    let classifier = Arc::new(Classifier::new(
        classifier_settings,
        model_store,
        cache.clone(),
    ));

    // Host collaborator: patient registry plus event fan-out to HTTP subscribers
    let patients = Arc::new(PatientRegistry::new());
    let (broadcast_tx, _) = broadcast::channel(config.events.broadcast_capacity.max(1));
    let (events, events_rx) = event_channel(config.events.channel_capacity);
    let dispatcher = tokio::spawn(run_dispatcher(
        events_rx,
        Arc::new(BroadcastHost::new(broadcast_tx.clone())),
    ));

    // Device ingestion (infrastructure layer)
    let ctx = Arc::new(ConnectionContext {
        cache,
        layout,
        patient: patients.clone(),
        events: events.clone(),
        settings: config.connection.settings(),
    });
    let listener = Arc::new(VitalsListener::new(ctx, config.listener.settings()));
    listener.start(config.listener.bind_address).await?;

    let state = Arc::new(AppState {
        prediction_service: PredictionService::new(classifier, events),
        patients,
        events: broadcast_tx,
        listener: listener.clone(),
    });

    // Build router (presentation layer)
    let router = Router::new()
        .route("/healthz", get(health_check))
        .route("/session", get(get_session).put(select_patient))
        .route("/predictions", post(predict_one))
        .route("/predictions/batch", post(predict_batch))
        .route("/events", get(stream_events))
        .route("/status", get(listener_status))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let api_addr = config.api.bind_address;
    tracing::info!(%api_addr, "starting vitals-manager API");
    axum::serve(tokio::net::TcpListener::bind(api_addr).await?, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    listener.stop().await;
    // last event sender goes with the listener context
    drop(listener);
    match tokio::time::timeout(Duration::from_secs(1), dispatcher).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "event dispatcher failed"),
        Err(_) => tracing::warn!("event dispatcher still running at exit"),
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
