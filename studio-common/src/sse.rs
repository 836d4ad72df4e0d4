//! Server-Sent Events (SSE) utilities

use crate::events::{EventBus, UploadEvent};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Convert an upload event into an SSE frame
///
/// Returns `None` if the event cannot be serialized.
pub fn upload_event_frame(event: &UploadEvent) -> Option<Event> {
    let event_type = event.event_type();
    match serde_json::to_string(event) {
        Ok(json) => Some(Event::default().event(event_type).data(json)),
        Err(e) => {
            warn!("SSE: Failed to serialize event {}: {}", event_type, e);
            None
        }
    }
}

/// Create an SSE stream carrying the upload events of a single user
///
/// Sends a `ConnectionStatus` frame first, then every event on the bus whose
/// `user_id` matches, with a heartbeat comment every 15 seconds.
pub fn create_user_event_stream(
    event_bus: &EventBus,
    user_id: String,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(user_id = %user_id, "New SSE client connected to upload events");

    let mut rx = event_bus.subscribe();

    let stream = async_stream::stream! {
        yield Ok(Event::default()
            .event("ConnectionStatus")
            .data("connected"));

        loop {
            match rx.recv().await {
                Ok(event) => {
                    if event.user_id() != user_id {
                        continue;
                    }
                    if let Some(frame) = upload_event_frame(&event) {
                        debug!(
                            user_id = %user_id,
                            upload_id = %event.upload_id(),
                            "SSE: Forwarding {}",
                            event.event_type()
                        );
                        yield Ok(frame);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(user_id = %user_id, skipped, "SSE: Upload event stream lagged");
                }
                Err(RecvError::Closed) => {
                    info!(user_id = %user_id, "SSE: Event bus closed, ending stream");
                    break;
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(HEARTBEAT_INTERVAL)
            .text("heartbeat"),
    )
}
