//! Timestamp utilities

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Time elapsed since `since`, clamped to zero for timestamps in the future
pub fn elapsed_since(since: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - since).to_std().unwrap_or(Duration::ZERO)
}

/// True if more than `max_age` has passed between `since` and `now`
pub fn is_older_than(since: DateTime<Utc>, now: DateTime<Utc>, max_age: Duration) -> bool {
    elapsed_since(since, now) > max_age
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_returns_recent_timestamp() {
        let timestamp = now();
        assert!(timestamp.timestamp() > 946_684_800); // 2000-01-01 00:00:00 UTC
        assert!(timestamp.timestamp() < 4_102_444_800); // 2100-01-01 00:00:00 UTC
    }

    #[test]
    fn test_elapsed_since_past() {
        let reference = now();
        let earlier = reference - chrono::Duration::seconds(90);
        assert_eq!(elapsed_since(earlier, reference), Duration::from_secs(90));
    }

    #[test]
    fn test_elapsed_since_future_clamps_to_zero() {
        let reference = now();
        let later = reference + chrono::Duration::seconds(5);
        assert_eq!(elapsed_since(later, reference), Duration::ZERO);
    }

    #[test]
    fn test_is_older_than_is_strict() {
        let reference = now();
        let thirty_minutes = Duration::from_secs(30 * 60);

        let exactly = reference - chrono::Duration::minutes(30);
        assert!(!is_older_than(exactly, reference, thirty_minutes));

        let beyond = reference - chrono::Duration::minutes(31);
        assert!(is_older_than(beyond, reference, thirty_minutes));
    }
}
