// Presentation layer - HTTP surface for the host application
pub mod app_state;
pub mod event_stream;
pub mod handlers;
pub mod host;
