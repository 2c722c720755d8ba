//! Window finder: partition one base interval into non-truncating windows.
//!
//! The common case costs one query: the whole base interval fits under the
//! server limit and the plan is that interval alone. Otherwise the finder
//! walks a cursor from the interval's start and, at each position,
//! binary-searches the longest window duration whose probe does not
//! truncate. Each probe is a single authoritative sample.
//!
//! # Known completeness limit
//!
//! The search is capped at `max_iterations` probes and never goes below
//! `min_window_secs`. When even the minimum duration truncates it is accepted
//! anyway so the cursor keeps moving; records beyond the server limit in
//! such a window are lost. The orchestrator counts these windows in
//! `RunStatistics::truncated_windows`.
//!
//! When the remaining span at a cursor is within `precision_secs` of
//! `min_window_secs`, the search ends before its first probe and the minimum
//! duration is taken untested. Near the end of a base interval this can add
//! minimum-length windows that were never sampled; they are still fetched and
//! counted as truncated if they hit the limit.

use crate::client::QueryClient;
use crate::error::IntervalError;
use crate::filter::FilterSet;
use crate::interval::Interval;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

/// Binary-search bounds, all in seconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOptions {
    pub min_window_secs: i64,
    pub max_window_secs: i64,
    pub max_iterations: u32,
    pub precision_secs: i64,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            min_window_secs: 60,
            max_window_secs: 3600,
            max_iterations: 12,
            precision_secs: 60,
        }
    }
}

impl SearchOptions {
    pub fn validate(&self) -> Result<(), String> {
        if self.min_window_secs < 1 {
            return Err("min_window_secs must be at least 1".into());
        }
        if self.max_window_secs < self.min_window_secs {
            return Err(format!(
                "max_window_secs ({}) must not be below min_window_secs ({})",
                self.max_window_secs, self.min_window_secs
            ));
        }
        if self.precision_secs < 1 {
            return Err("precision_secs must be at least 1".into());
        }
        if self.max_iterations == 0 {
            return Err("max_iterations must be greater than 0".into());
        }
        Ok(())
    }
}

/// Ordered, gap-free, non-overlapping windows covering exactly one base interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowPlan {
    base: Interval,
    windows: Vec<Interval>,
}

impl WindowPlan {
    pub fn single(base: Interval) -> Self {
        Self {
            base,
            windows: vec![base],
        }
    }

    pub fn base(&self) -> &Interval {
        &self.base
    }

    pub fn windows(&self) -> &[Interval] {
        &self.windows
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn is_single(&self) -> bool {
        self.windows.len() == 1
    }

    /// Whether the windows partition the base interval exactly.
    pub fn is_partition(&self) -> bool {
        let (Some(first), Some(last)) = (self.windows.first(), self.windows.last()) else {
            return false;
        };
        first.start() == self.base.start()
            && last.end() == self.base.end()
            && self
                .windows
                .windows(2)
                .all(|pair| pair[0].end() == pair[1].start())
    }
}

/// Plans one base interval through a [`QueryClient`].
pub struct WindowFinder<'a> {
    client: &'a QueryClient,
    options: &'a SearchOptions,
}

impl<'a> WindowFinder<'a> {
    pub fn new(client: &'a QueryClient, options: &'a SearchOptions) -> Self {
        Self { client, options }
    }

    pub async fn plan(
        &self,
        base: &Interval,
        filters: &FilterSet,
    ) -> Result<WindowPlan, IntervalError> {
        let full = self.client.execute(base, filters).await?;
        if full.exhausted {
            return Err(IntervalError::Exhausted { interval: *base });
        }
        if !full.truncated {
            debug!(interval = %base, count = full.count, "Base interval fits in one query");
            return Ok(WindowPlan::single(*base));
        }

        info!(
            interval = %base,
            count = full.count,
            "Base interval truncated; searching sub-windows"
        );

        let mut windows = Vec::new();
        let mut cursor = base.start();

        while cursor < base.end() {
            let remaining = (base.end() - cursor).num_seconds();
            let ceiling = remaining.min(self.options.max_window_secs);
            let secs = self.optimal_duration(base, cursor, ceiling, filters).await?;

            let window = base.clamped_window(cursor, secs);
            cursor = window.end();
            windows.push(window);
        }

        info!(interval = %base, windows = windows.len(), "Sub-window plan complete");

        Ok(WindowPlan {
            base: *base,
            windows,
        })
    }

    /// Longest tested non-truncating duration from `start`, or
    /// `min_window_secs` when none was found.
    async fn optimal_duration(
        &self,
        base: &Interval,
        start: DateTime<Utc>,
        ceiling: i64,
        filters: &FilterSet,
    ) -> Result<i64, IntervalError> {
        let precision = self.options.precision_secs;
        let mut low = self.options.min_window_secs;
        let mut high = ceiling;
        let mut best = self.options.min_window_secs;

        for _ in 0..self.options.max_iterations {
            if high - low <= precision {
                break;
            }

            let mid = low + (high - low) / 2;
            let probe = base.clamped_window(start, mid);
            let result = self.client.execute(&probe, filters).await?;
            if result.exhausted {
                return Err(IntervalError::Exhausted { interval: probe });
            }

            if result.truncated {
                high = mid - precision;
            } else {
                best = mid;
                low = mid + precision;
            }
        }

        Ok(best)
    }
}
