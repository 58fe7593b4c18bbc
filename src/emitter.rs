use std::convert::Infallible;

use axum::response::sse::Event;
use futures_util::stream::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::DropGuard;

use crate::types::ScanEvent;

/// Serialize one scan event as a JSON object.
pub fn to_json(event: &ScanEvent) -> String {
    serde_json::to_string(event).unwrap_or_else(|e| {
        serde_json::json!({ "type": "error", "message": e.to_string() }).to_string()
    })
}

/// One scan event as an unnamed SSE message: `data: <json>\n\n`.
pub fn sse_event(event: &ScanEvent) -> Event {
    Event::default().data(to_json(event))
}

/// Forward session events to an SSE response.
///
/// The guard rides along with the stream, so when the client disconnects and
/// the response body is dropped the session's token is cancelled.
pub fn event_stream(
    mut events: mpsc::Receiver<ScanEvent>,
    guard: DropGuard,
) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
    async_stream::stream! {
        let _guard = guard;
        while let Some(event) = events.recv().await {
            let terminal = event.is_terminal();
            yield Ok(sse_event(&event));
            if terminal {
                break;
            }
        }
    }
}

/// A stream that yields exactly one event and ends.
pub fn single_event(event: ScanEvent) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
    tokio_stream::once(Ok(sse_event(&event)))
}
