// Application layer - Ingestion state and classification use cases
pub mod classifier;
pub mod decision_model;
pub mod events;
pub mod inference_cache;
pub mod ppv;
pub mod prediction_service;
