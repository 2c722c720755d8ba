//! Half-open time intervals `[start, end)`.
//!
//! Every window boundary in the workspace uses the same convention: the end
//! timestamp of one window is the start of the next and belongs only to the
//! later one, so adjacent windows never share a record.

use chrono::{DateTime, Duration, Utc};
use std::fmt;
use thiserror::Error;

const DISPLAY_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Error returned when an interval would be empty or inverted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("interval start {start} must be before end {end}")]
pub struct InvalidInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// A non-empty half-open time range. Copied, never shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Interval {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl Interval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, InvalidInterval> {
        if start >= end {
            return Err(InvalidInterval { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Whole seconds covered by the interval.
    pub fn duration_secs(&self) -> i64 {
        (self.end - self.start).num_seconds()
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts < self.end
    }

    /// Short bucket label used in log fields, e.g. `20250620_09`.
    pub fn bucket_label(&self) -> String {
        self.start.format("%Y%m%d_%H").to_string()
    }

    /// Window of `secs` seconds starting at `from`, clamped to this interval's end.
    ///
    /// Callers guarantee `from` lies inside the interval and `secs > 0`, which
    /// keeps the result non-empty.
    pub(crate) fn clamped_window(&self, from: DateTime<Utc>, secs: i64) -> Interval {
        debug_assert!(self.contains(from));
        debug_assert!(secs > 0);
        let end = (from + Duration::seconds(secs)).min(self.end);
        Interval { start: from, end }
    }

    /// Split into contiguous pieces aligned to multiples of `step_secs` since
    /// the Unix epoch (hour boundaries for `3600`). The first piece starts at
    /// `start` and the last is clipped to `end`.
    pub fn split_aligned(&self, step_secs: i64) -> Vec<Interval> {
        let step = step_secs.max(1);
        let mut pieces = Vec::new();
        let mut cursor = self.start;

        while cursor < self.end {
            let into_step = cursor.timestamp().rem_euclid(step);
            // Sub-second starts still advance to the next aligned boundary.
            let boundary = cursor
                - Duration::nanoseconds(i64::from(cursor.timestamp_subsec_nanos()))
                + Duration::seconds(step - into_step);
            let next = boundary.min(self.end);
            pieces.push(Interval {
                start: cursor,
                end: next,
            });
            cursor = next;
        }

        pieces
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {})",
            self.start.format(DISPLAY_FORMAT),
            self.end.format(DISPLAY_FORMAT)
        )
    }
}
