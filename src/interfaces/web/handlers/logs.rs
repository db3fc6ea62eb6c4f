use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, Sse};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};

use super::super::AppState;
use crate::core::events::LogEvent;

/// An idle second on the broadcast stream produces a heartbeat frame, so a
/// dashboard can tell "quiet" from "disconnected".
const HEARTBEAT_IDLE: Duration = Duration::from_secs(1);

fn frame(event: &LogEvent) -> Event {
    Event::default().data(serde_json::to_string(event).unwrap_or_default())
}

/// The shared log stream: a `connected` frame, recent history replay, then
/// live events interleaved with idle heartbeats.
///
/// A forwarder task owns the hub subscription; when the client goes away the
/// receiver closes, the forwarder's send fails, and dropping the
/// subscription unregisters it from the hub.
pub async fn stream_logs(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut subscription = state.hub.subscribe();
    let (tx, rx) = tokio::sync::mpsc::channel::<LogEvent>(32);

    tokio::spawn(async move {
        if tx.send(LogEvent::connected()).await.is_err() {
            return;
        }
        loop {
            let event = match tokio::time::timeout(HEARTBEAT_IDLE, subscription.recv()).await {
                Ok(Some(event)) => event,
                // Hub gone; nothing more will arrive.
                Ok(None) => break,
                Err(_) => LogEvent::heartbeat(),
            };
            if tx.send(event).await.is_err() {
                break;
            }
        }
    });

    let stream = ReceiverStream::new(rx).map(|event| Ok(frame(&event)));
    Sse::new(stream)
}
