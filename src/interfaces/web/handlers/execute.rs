use std::convert::Infallible;

use axum::Json;
use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::json;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tracing::warn;

use super::super::AppState;
use super::failure;
use crate::core::events::LogEvent;

#[derive(Deserialize)]
pub struct ExecuteRequest {
    pub action_id: String,
}

fn frame(event: &LogEvent) -> Event {
    Event::default().data(serde_json::to_string(event).unwrap_or_default())
}

/// Sync-stream mode: the caller holds the connection open and receives the
/// full `start` / `output`* / terminal sequence as SSE frames. A resolution
/// failure still answers with a stream, carrying a single `error` frame, so
/// dashboards consume one shape either way.
pub async fn execute_device_action(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    Json(request): Json<ExecuteRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = match state
        .dispatcher
        .dispatch_stream(&device_id, &request.action_id)
        .await
    {
        Ok(rx) => rx,
        Err(e) => {
            warn!(device_id, error = %e, "execute rejected");
            let (tx, rx) = tokio::sync::mpsc::channel(1);
            let _ = tx.try_send(LogEvent::error(e.to_string(), None));
            rx
        }
    };

    let stream = ReceiverStream::new(rx).map(|event| Ok(frame(&event)));
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Async-to-hub mode: acknowledge immediately, watch the log stream for the
/// outcome.
pub async fn trigger_device_action(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    Json(request): Json<ExecuteRequest>,
) -> Response {
    match state
        .dispatcher
        .dispatch_to_hub(&device_id, &request.action_id)
        .await
    {
        Ok(ack) => Json(json!({
            "status": "success",
            "message": format!("Triggered: {} - {}", ack.device, ack.action),
            "device": ack.device,
            "action": ack.action,
        }))
        .into_response(),
        Err(e) => failure(&e).into_response(),
    }
}
