use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::TimeFormat;

/// Skew the minute-indexed backends expect on top of the rounded-up minute count.
const MINUTE_INDEX_SKEW: i64 = 2;

/// A quantized publication instant, in whole seconds since 1970-01-01T00:00:00Z.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct TimeSlot(i64);

impl TimeSlot {
    pub fn from_epoch(epoch: i64) -> Self {
        Self(epoch)
    }

    pub fn epoch(self) -> i64 {
        self.0
    }

    pub fn datetime(self) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(self.0, 0).unwrap_or_default()
    }

    /// The slot one interval earlier.
    pub fn previous(self, interval_secs: u32) -> Self {
        Self(self.0 - i64::from(interval_secs))
    }

    pub fn stamp(self, format: &TimeFormat) -> String {
        self.datetime().format(format.as_str()).to_string()
    }

    /// Human-readable `YYYY-MM-DD HH:MM:SS` rendering used in sidecars.
    pub fn display_time(self) -> String {
        self.datetime().format("%Y-%m-%d %H:%M:%S").to_string()
    }

    /// Minutes since the epoch, rounded up, plus the backend skew.
    pub fn minute_index(self) -> i64 {
        let minutes = self.0.div_euclid(60);
        let partial = i64::from(self.0.rem_euclid(60) > 0);
        minutes + partial + MINUTE_INDEX_SKEW
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_time())
    }
}

/// Most recent slot `t <= now` with `t ≡ offset (mod interval)`.
pub fn latest_slot(now: DateTime<Utc>, interval_secs: u32, offset_secs: i64) -> TimeSlot {
    let interval = i64::from(interval_secs.max(1));
    let shifted = now.timestamp() - offset_secs;
    TimeSlot(shifted.div_euclid(interval) * interval + offset_secs)
}

/// Slots from `start` backwards, one interval apart.
pub fn slots_from(start: TimeSlot, interval_secs: u32) -> impl Iterator<Item = TimeSlot> {
    std::iter::successors(Some(start), move |slot| Some(slot.previous(interval_secs)))
}
