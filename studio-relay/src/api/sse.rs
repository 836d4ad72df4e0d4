//! Server-Sent Events for upload progress

use crate::api::auth::Caller;
use crate::AppState;
use axum::{
    extract::{Extension, State},
    response::sse::{Event, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;

/// GET /api/events - SSE stream of the caller's upload events
///
/// Streams events:
/// - ConnectionStatus (once, on connect)
/// - UploadProgress, UploadCompleted, UploadFailed for the caller's uploads
pub async fn event_stream(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    studio_common::sse::create_user_event_stream(&state.event_bus, caller.user_id)
}
