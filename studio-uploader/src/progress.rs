//! Upload progress reporting
//!
//! Request bodies are streamed in slices through a counter; the caller's
//! callback receives the whole-number percentage each time it increases.

use bytes::Bytes;
use futures::stream;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

/// Callback receiving a 0-100 percentage
pub type ProgressFn = Arc<dyn Fn(u8) + Send + Sync>;

/// Size of the slices a counted body is streamed in
pub const STREAM_SLICE: usize = 64 * 1024;

/// Callback that ignores progress
pub fn noop() -> ProgressFn {
    Arc::new(|_| {})
}

pub struct ProgressTracker {
    total: u64,
    sent: AtomicU64,
    /// Last reported percentage plus one; 0 before the first report
    reported: AtomicU8,
    callback: ProgressFn,
}

impl ProgressTracker {
    pub fn new(total: u64, callback: ProgressFn) -> Arc<Self> {
        Arc::new(Self {
            total,
            sent: AtomicU64::new(0),
            reported: AtomicU8::new(0),
            callback,
        })
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::SeqCst)
    }

    /// Count `bytes` more as sent
    pub fn advance(&self, bytes: u64) {
        let sent = self.sent.fetch_add(bytes, Ordering::SeqCst) + bytes;
        self.report(sent);
    }

    /// Set the absolute number of bytes confirmed so far
    pub fn set_position(&self, sent: u64) {
        self.sent.store(sent, Ordering::SeqCst);
        self.report(sent);
    }

    /// Restart counting before a retried attempt
    pub fn rewind(&self, to: u64) {
        self.sent.store(to, Ordering::SeqCst);
    }

    pub fn finish(&self) {
        self.set_position(self.total);
    }

    fn report(&self, sent: u64) {
        let percent = percent_of(sent, self.total);
        let previous = self.reported.fetch_max(percent + 1, Ordering::SeqCst);
        if previous < percent + 1 {
            (self.callback)(percent);
        }
    }
}

/// `sent / total` as a whole percentage, capped at 100; an empty body is 100
pub fn percent_of(sent: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    ((sent.min(total) as u128 * 100) / total as u128) as u8
}

/// Request body that streams `data` in slices and counts them on `tracker`
pub fn counting_body(data: Bytes, tracker: Arc<ProgressTracker>) -> reqwest::Body {
    let len = data.len();
    let slices = (0..len).step_by(STREAM_SLICE).map(move |start| {
        let slice = data.slice(start..(start + STREAM_SLICE).min(len));
        tracker.advance(slice.len() as u64);
        Ok::<Bytes, std::io::Error>(slice)
    });
    reqwest::Body::wrap_stream(stream::iter(slices))
}
