//! Timestamp and duration helpers.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Represents a timestamp that can be serialized/deserialized.
pub type Timestamp = DateTime<Utc>;

/// Returns the current UTC time as an ISO 8601 formatted string.
///
/// # Examples
///
/// ```
/// use stageguard::utils::iso_timestamp;
///
/// let ts = iso_timestamp();
/// assert!(ts.contains('T'));
/// assert!(ts.ends_with("+00:00"));
/// ```
#[must_use]
pub fn iso_timestamp() -> String {
    format_timestamp(&Utc::now())
}

/// Formats a timestamp as ISO 8601 with microsecond precision.
#[must_use]
pub fn format_timestamp(ts: &Timestamp) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.6f+00:00").to_string()
}

/// Converts fractional seconds into a `Duration`.
///
/// Negative, NaN and infinite inputs collapse to zero.
#[must_use]
pub fn duration_from_secs(seconds: f64) -> Duration {
    if seconds.is_finite() && seconds > 0.0 {
        Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
    } else {
        Duration::ZERO
    }
}

/// Converts fractional seconds into a `chrono::Duration` for timestamp math.
#[must_use]
pub fn chrono_from_secs(seconds: f64) -> chrono::Duration {
    // Out-of-range values saturate at a century.
    chrono::Duration::from_std(duration_from_secs(seconds))
        .unwrap_or_else(|_| chrono::Duration::weeks(52 * 100))
}
