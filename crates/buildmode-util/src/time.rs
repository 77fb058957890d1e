//! Time utilities for buildmoded
//!
//! Session deadlines and cooldowns are wall-clock instants: they are
//! persisted across restarts, so they cannot be monotonic `Instant`s.
//! Core operations never read the clock themselves; callers pass `now`.
//!
//! # Mock Time for Development
//!
//! In debug builds, `BUILDMODE_MOCK_TIME` overrides the system time for
//! [`now`]. The mock clock advances at the real rate from the given start.
//!
//! Format: `YYYY-MM-DD HH:MM:SS` (e.g., `2025-12-25 14:30:00`)

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use std::sync::OnceLock;
use std::time::Duration;

/// Environment variable name for mock time (debug builds only)
pub const MOCK_TIME_ENV_VAR: &str = "BUILDMODE_MOCK_TIME";

static MOCK_TIME_OFFSET: OnceLock<Option<chrono::Duration>> = OnceLock::new();

#[allow(clippy::disallowed_methods)] // Wraps Local::now()
fn get_mock_time_offset() -> Option<chrono::Duration> {
    *MOCK_TIME_OFFSET.get_or_init(|| {
        #[cfg(debug_assertions)]
        {
            if let Ok(mock_time_str) = std::env::var(MOCK_TIME_ENV_VAR) {
                match NaiveDateTime::parse_from_str(&mock_time_str, "%Y-%m-%d %H:%M:%S") {
                    Ok(naive_dt) => match Local.from_local_datetime(&naive_dt).single() {
                        Some(mock_dt) => {
                            let offset = mock_dt.signed_duration_since(chrono::Local::now());
                            tracing::info!(
                                mock_time = %mock_time_str,
                                offset_secs = offset.num_seconds(),
                                "Mock time enabled"
                            );
                            return Some(offset);
                        }
                        None => {
                            tracing::warn!(
                                mock_time = %mock_time_str,
                                "Failed to convert mock time to local timezone"
                            );
                        }
                    },
                    Err(_) => {
                        tracing::warn!(
                            mock_time = %mock_time_str,
                            expected_format = "%Y-%m-%d %H:%M:%S",
                            "Invalid mock time format"
                        );
                    }
                }
            }
            None
        }
        #[cfg(not(debug_assertions))]
        {
            None
        }
    })
}

/// Current local time, respecting `BUILDMODE_MOCK_TIME` in debug builds.
#[allow(clippy::disallowed_methods)] // This is the wrapper that provides mock time support
pub fn now() -> DateTime<Local> {
    let real_now = chrono::Local::now();

    match get_mock_time_offset() {
        Some(offset) => real_now + offset,
        None => real_now,
    }
}

/// Milliseconds since the Unix epoch, the persisted timestamp format.
pub fn to_epoch_millis(dt: &DateTime<Local>) -> i64 {
    dt.timestamp_millis()
}

/// Inverse of [`to_epoch_millis`]. Returns `None` for out-of-range values.
pub fn from_epoch_millis(millis: i64) -> Option<DateTime<Local>> {
    Local.timestamp_millis_opt(millis).single()
}

/// Add a std `Duration` to a wall-clock instant.
///
/// Returns `None` instead of panicking when the result is not representable.
pub fn checked_add(dt: DateTime<Local>, by: Duration) -> Option<DateTime<Local>> {
    let by = chrono::Duration::from_std(by).ok()?;
    dt.checked_add_signed(by)
}

/// Time from `earlier` to `later`, saturating at zero.
pub fn saturating_elapsed(later: DateTime<Local>, earlier: DateTime<Local>) -> Duration {
    later
        .signed_duration_since(earlier)
        .to_std()
        .unwrap_or(Duration::ZERO)
}

/// Whole minutes as a `Duration`
pub fn minutes(n: u64) -> Duration {
    Duration::from_secs(n.saturating_mul(60))
}

/// Helper to format durations in human-readable form
pub fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_millis_round_trip_keeps_millisecond_precision() {
        let dt = Local.with_ymd_and_hms(2025, 12, 26, 15, 0, 0).unwrap()
            + chrono::Duration::milliseconds(123);
        let millis = to_epoch_millis(&dt);
        assert_eq!(from_epoch_millis(millis), Some(dt));
    }

    #[test]
    fn from_epoch_millis_rejects_out_of_range() {
        assert!(from_epoch_millis(i64::MAX).is_none());
    }

    #[test]
    fn checked_add_does_not_overflow() {
        let dt = Local.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            checked_add(dt, Duration::from_secs(90)),
            Some(dt + chrono::Duration::seconds(90))
        );
        assert!(checked_add(dt, Duration::from_secs(u64::MAX)).is_none());
    }

    #[test]
    fn saturating_elapsed_clamps_negative() {
        let earlier = Local.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let later = earlier + chrono::Duration::seconds(5);
        assert_eq!(saturating_elapsed(later, earlier), Duration::from_secs(5));
        assert_eq!(saturating_elapsed(earlier, later), Duration::ZERO);
    }

    #[test]
    fn minutes_saturates() {
        assert_eq!(minutes(2), Duration::from_secs(120));
        assert_eq!(minutes(u64::MAX), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_duration(Duration::from_secs(3661)), "1h 1m 1s");
    }

    #[test]
    fn test_now_returns_time() {
        let t = now();
        assert!(t.timestamp() > 0);
    }
}
