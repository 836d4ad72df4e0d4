//! Upload event types and the broadcast EventBus
//!
//! Events are emitted by the relay as chunks arrive and uploads finish,
//! and are forwarded to the uploading user's SSE stream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Upload lifecycle events
///
/// Every event carries the `user_id` it belongs to; SSE streams only
/// forward events whose `user_id` matches the connected caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum UploadEvent {
    /// A chunk was accepted; `percent` is chunks received over chunks expected
    UploadProgress {
        upload_id: String,
        user_id: String,
        /// 0-100
        percent: u8,
        timestamp: DateTime<Utc>,
    },

    /// The assembled file was handed to the storage vendor
    UploadCompleted {
        upload_id: String,
        user_id: String,
        /// Public or signed URL returned by the vendor relay
        url: String,
        timestamp: DateTime<Utc>,
    },

    /// The vendor relay rejected the assembled file
    UploadFailed {
        upload_id: String,
        user_id: String,
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl UploadEvent {
    /// Event name used for the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            UploadEvent::UploadProgress { .. } => "UploadProgress",
            UploadEvent::UploadCompleted { .. } => "UploadCompleted",
            UploadEvent::UploadFailed { .. } => "UploadFailed",
        }
    }

    /// User the event is addressed to
    pub fn user_id(&self) -> &str {
        match self {
            UploadEvent::UploadProgress { user_id, .. }
            | UploadEvent::UploadCompleted { user_id, .. }
            | UploadEvent::UploadFailed { user_id, .. } => user_id,
        }
    }

    /// Upload the event refers to
    pub fn upload_id(&self) -> &str {
        match self {
            UploadEvent::UploadProgress { upload_id, .. }
            | UploadEvent::UploadCompleted { upload_id, .. }
            | UploadEvent::UploadFailed { upload_id, .. } => upload_id,
        }
    }
}

/// Broadcast channel for upload events
///
/// Cloning an `EventBus` yields a handle onto the same channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<UploadEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before lagging receivers drop old events
    ///
    /// # Examples
    ///
    /// ```
    /// use studio_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// assert_eq!(event_bus.capacity(), 100);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<UploadEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists,
    /// `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: UploadEvent,
    ) -> Result<usize, broadcast::error::SendError<UploadEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    ///
    /// Progress events are fire-and-forget: an upload with nobody watching
    /// is still a valid upload.
    pub fn emit_lossy(&self, event: UploadEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
