//! Time interval support for session reservations.

use crate::error::{TychoError, TychoResult};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A half-open time interval `[begin, end)` in UTC.
///
/// The begin instant belongs to the interval, the end instant does not:
/// a session booked for `[10:00, 12:00)` is active at 11:00 and already
/// over at exactly 12:00.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeInterval {
    begin: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeInterval {
    /// Create an interval; fails if `end` precedes `begin`.
    pub fn new(begin: DateTime<Utc>, end: DateTime<Utc>) -> TychoResult<Self> {
        if end < begin {
            return Err(TychoError::invalid_input(format!(
                "Invalid time interval: end [{}] precedes begin [{}]",
                end, begin
            )));
        }
        Ok(TimeInterval { begin, end })
    }

    /// Interval starting at `begin` with the given duration.
    pub fn from_duration(begin: DateTime<Utc>, duration: Duration) -> TychoResult<Self> {
        Self::new(begin, begin + duration)
    }

    pub fn begin(&self) -> DateTime<Utc> {
        self.begin
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.begin
    }

    /// True if `t` falls inside the half-open interval.
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.begin <= t && t < self.end
    }

    /// True if the two intervals share at least one instant.
    pub fn intersects(&self, other: &TimeInterval) -> bool {
        self.begin < other.end && other.begin < self.end
    }
}

impl fmt::Display for TimeInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.begin, self.end)
    }
}
