// Infrastructure layer - Wire protocol, sockets, model artifacts and configuration
pub mod config;
pub mod connection;
pub mod forest_model;
pub mod framing;
pub mod listener;
pub mod model_store;
pub mod wire_codec;
pub mod xgboost_model;
