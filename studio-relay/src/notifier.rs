//! Upload progress notification
//!
//! Handlers receive a `ProgressNotifier` through `AppState` and report
//! per-user progress through it; the production notifier publishes onto the
//! shared `EventBus`, which `GET /api/events` forwards to the user's stream.

use chrono::Utc;
use std::sync::Arc;
use studio_common::events::{EventBus, UploadEvent};
use tracing::debug;

/// Receives upload lifecycle events
pub trait ProgressNotifier: Send + Sync {
    fn notify(&self, event: UploadEvent);
}

/// Publishes events on the broadcast `EventBus`
#[derive(Clone)]
pub struct EventBusNotifier {
    event_bus: EventBus,
}

impl EventBusNotifier {
    pub fn new(event_bus: EventBus) -> Self {
        Self { event_bus }
    }
}

impl ProgressNotifier for EventBusNotifier {
    fn notify(&self, event: UploadEvent) {
        debug!(
            user_id = %event.user_id(),
            upload_id = %event.upload_id(),
            subscribers = self.event_bus.subscriber_count(),
            "Publishing {}",
            event.event_type()
        );
        self.event_bus.emit_lossy(event);
    }
}

/// Discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl ProgressNotifier for NoopNotifier {
    fn notify(&self, _event: UploadEvent) {}
}

/// Percentage of chunks received, clamped to 0-100
pub fn percent_complete(received: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    ((u64::from(received) * 100) / u64::from(total)).min(100) as u8
}

/// Convenience wrappers that stamp events with the current time
pub trait NotifierExt {
    fn progress(&self, upload_id: &str, user_id: &str, percent: u8);
    fn completed(&self, upload_id: &str, user_id: &str, url: &str);
    fn failed(&self, upload_id: &str, user_id: &str, message: &str);
}

impl NotifierExt for Arc<dyn ProgressNotifier> {
    fn progress(&self, upload_id: &str, user_id: &str, percent: u8) {
        self.notify(UploadEvent::UploadProgress {
            upload_id: upload_id.to_string(),
            user_id: user_id.to_string(),
            percent,
            timestamp: Utc::now(),
        });
    }

    fn completed(&self, upload_id: &str, user_id: &str, url: &str) {
        self.notify(UploadEvent::UploadCompleted {
            upload_id: upload_id.to_string(),
            user_id: user_id.to_string(),
            url: url.to_string(),
            timestamp: Utc::now(),
        });
    }

    fn failed(&self, upload_id: &str, user_id: &str, message: &str) {
        self.notify(UploadEvent::UploadFailed {
            upload_id: upload_id.to_string(),
            user_id: user_id.to_string(),
            message: message.to_string(),
            timestamp: Utc::now(),
        });
    }
}
