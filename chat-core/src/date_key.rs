//! Calendar-day keys for message buckets.

use chrono::{DateTime, Datelike, FixedOffset, Offset, Utc};
use std::fmt;

/// A local calendar day encoded as `YYYYMMDD`.
///
/// The numeric encoding orders the same way as the calendar, so bucket
/// keys can be kept sorted with plain integer comparison.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateKey(u32);

impl DateKey {
    /// Create a key from an already encoded `YYYYMMDD` value.
    pub fn new(value: u32) -> Self {
        Self(value)
    }

    /// Key of the local day `timestamp` falls on, given the local UTC offset.
    pub fn from_timestamp(timestamp: DateTime<Utc>, offset: FixedOffset) -> Self {
        let local = timestamp.with_timezone(&offset);
        let year = u32::try_from(local.year()).unwrap_or(0);
        Self(year * 10_000 + local.month() * 100 + local.day())
    }

    /// The encoded `YYYYMMDD` value.
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for DateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08}", self.0)
    }
}

impl fmt::Debug for DateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DateKey({:08})", self.0)
    }
}

/// Fixed offset for `minutes` east of UTC. Out-of-range values fall back to UTC.
pub fn utc_offset(minutes: i32) -> FixedOffset {
    minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .unwrap_or_else(|| Utc.fix())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn key_encodes_utc_day() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 9, 23, 30, 0).unwrap();
        let key = DateKey::from_timestamp(ts, utc_offset(0));
        assert_eq!(key.value(), 20240309);
        assert_eq!(key.to_string(), "20240309");
    }

    #[test]
    fn offset_moves_late_evening_to_next_day() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 9, 23, 30, 0).unwrap();
        let key = DateKey::from_timestamp(ts, utc_offset(8 * 60));
        assert_eq!(key.value(), 20240310);
    }

    #[test]
    fn negative_offset_moves_early_morning_to_previous_day() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 2, 0, 0).unwrap();
        let key = DateKey::from_timestamp(ts, utc_offset(-5 * 60));
        assert_eq!(key.value(), 20231231);
    }

    #[test]
    fn keys_order_chronologically() {
        assert!(DateKey::new(20231231) < DateKey::new(20240101));
        assert!(DateKey::new(20240101) < DateKey::new(20240102));
    }

    #[test]
    fn invalid_offset_falls_back_to_utc() {
        assert_eq!(utc_offset(48 * 60), Utc.fix());
        assert_eq!(utc_offset(i32::MAX), Utc.fix());
    }
}
