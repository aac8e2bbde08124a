//! Epoch-millisecond helpers.
//!
//! Token expiry is carried as milliseconds since the Unix epoch, which is
//! the format Google's client libraries write to the saved-token file.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Milliseconds since the Unix epoch.
pub type EpochMillis = i64;

/// Returns the current time in epoch milliseconds.
pub fn now_millis() -> EpochMillis {
    Utc::now().timestamp_millis()
}

/// Returns how long to wait from `now` until `deadline`, minus `lead`.
///
/// Deadlines in the past (or closer than `lead`) yield [`Duration::ZERO`].
pub fn delay_until(deadline: EpochMillis, now: EpochMillis, lead: Duration) -> Duration {
    let lead_ms = i64::try_from(lead.as_millis()).unwrap_or(i64::MAX);
    let remaining = deadline.saturating_sub(now).saturating_sub(lead_ms);
    if remaining <= 0 {
        Duration::ZERO
    } else {
        Duration::from_millis(remaining as u64)
    }
}

/// Formats epoch milliseconds as RFC 3339 for display.
///
/// Out-of-range values are rendered as the raw number.
pub fn format_millis(millis: EpochMillis) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| millis.to_string())
}
