// Chunked NDJSON streaming of monitor events
use axum::body::Body;
use axum::http::{header, Response, StatusCode};
use axum::response::IntoResponse;
use bytes::{BufMut, Bytes, BytesMut};
use futures::stream::Stream;
use futures::StreamExt;
use tokio::sync::broadcast;

use crate::application::events::MonitorEvent;

/// Create a chunked NDJSON streaming response
pub fn ndjson_stream<S>(stream: S) -> Result<Response<Body>, StatusCode>
where
    S: Stream<Item = MonitorEvent> + Send + 'static,
{
    let byte_stream = stream.map(serialize_line);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/x-ndjson")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(byte_stream))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

/// Serialize a single event to one newline-terminated JSON line
fn serialize_line(event: MonitorEvent) -> Result<Bytes, std::io::Error> {
    let json = serde_json::to_vec(&event)?;
    let mut line = BytesMut::with_capacity(json.len() + 1);
    line.put_slice(&json);
    line.put_u8(b'\n');
    Ok(line.freeze())
}

/// Helper to create a streaming response from a broadcast subscription
pub fn stream_from_broadcast(mut rx: broadcast::Receiver<MonitorEvent>) -> impl IntoResponse {
    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => yield event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event subscriber lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    match ndjson_stream(stream) {
        Ok(response) => response,
        Err(status) => status.into_response(),
    }
}
