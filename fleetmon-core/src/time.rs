//! UTC timestamp helpers
//!
//! Stored timestamps use one fixed-width RFC 3339 layout so that text
//! ordering matches chronological ordering.

use crate::error::{CoreError, Result};
use crate::SECONDS_PER_DAY;
use chrono::{DateTime, Duration, NaiveTime, SecondsFormat, Utc};

/// Format a timestamp as `YYYY-MM-DDTHH:MM:SS.ffffffZ`
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse any RFC 3339 timestamp into UTC
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| CoreError::InvalidTimestamp {
            value: value.to_string(),
            reason: e.to_string(),
        })
}

/// Midnight (00:00 UTC) of the day containing `ts`
pub fn day_start(ts: &DateTime<Utc>) -> DateTime<Utc> {
    ts.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// Half-open range `[begin, end)` covering the last `days` calendar days,
/// today included
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub begin: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DayWindow {
    pub fn contains(&self, ts: &DateTime<Utc>) -> bool {
        *ts >= self.begin && *ts < self.end
    }

    pub fn is_empty(&self) -> bool {
        self.begin >= self.end
    }
}

/// Window of the last `days` UTC calendar days relative to `now`
///
/// `days == 0` yields an empty window. Bounds saturate at the representable
/// date range.
pub fn day_window(days: u32, now: &DateTime<Utc>) -> DayWindow {
    let end = day_start(now)
        .checked_add_signed(Duration::seconds(SECONDS_PER_DAY))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);
    let begin = end
        .checked_sub_signed(Duration::seconds(SECONDS_PER_DAY * i64::from(days)))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    DayWindow { begin, end }
}
