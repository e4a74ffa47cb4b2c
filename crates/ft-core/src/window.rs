//! Time windows for bounding aggregation.
//!
//! All aggregates are pure functions of (records, `now`), so every window is
//! derived from a caller-supplied instant. Calendar-day boundaries ("today",
//! day bucketing for streaks and the timeline) are computed in a configured
//! fixed reference offset rather than the machine's local zone, keeping
//! aggregation deterministic in tests and across hosts.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};

/// A half-open time interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Whether an instant falls inside the window.
    #[must_use]
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant < self.end
    }

    /// The calendar day containing `now` in the reference offset:
    /// `[midnight, midnight + 24h)`.
    #[must_use]
    pub fn day_of(now: DateTime<Utc>, offset: FixedOffset) -> Self {
        let start = midnight_before(now, offset);
        Self {
            start,
            end: start + Duration::days(1),
        }
    }

    /// The trailing window `[now - days, now)`.
    #[must_use]
    pub fn trailing_days(now: DateTime<Utc>, days: i64) -> Self {
        Self {
            start: now - Duration::days(days),
            end: now,
        }
    }
}

/// Builds the reference offset from a configured minutes-east-of-UTC value.
///
/// Out-of-range values (beyond ±24h) fall back to UTC rather than failing a
/// summary request over a config typo.
#[must_use]
pub fn reference_offset(utc_offset_minutes: i32) -> FixedOffset {
    FixedOffset::east_opt(utc_offset_minutes.saturating_mul(60)).unwrap_or_else(|| {
        tracing::warn!(utc_offset_minutes, "offset out of range, using UTC");
        utc()
    })
}

/// The UTC reference offset.
#[must_use]
pub fn utc() -> FixedOffset {
    FixedOffset::east_opt(0).expect("zero offset is always valid")
}

/// The calendar day an instant falls on, in the reference offset.
#[must_use]
pub fn local_day(instant: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    instant.with_timezone(&offset).date_naive()
}

/// Midnight at the start of the day containing `now`, in UTC.
fn midnight_before(now: DateTime<Utc>, offset: FixedOffset) -> DateTime<Utc> {
    let day = local_day(now, offset);
    let midnight = day.and_time(NaiveTime::MIN);
    // A fixed offset has no gaps or folds, so the local instant is unique.
    offset
        .from_local_datetime(&midnight)
        .single()
        .expect("fixed offsets map local midnight to exactly one instant")
        .with_timezone(&Utc)
}
