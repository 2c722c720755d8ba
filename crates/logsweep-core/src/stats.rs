//! Run statistics.
//!
//! Workers update [`RunCounters`] with relaxed atomic increments; the
//! orchestrator takes a [`RunStatistics`] snapshot once every worker has
//! finished.

use crate::filter::FilterDimension;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Shared counters for one collection run.
#[derive(Debug, Default)]
pub struct RunCounters {
    requests: AtomicU64,
    exhausted_queries: AtomicU64,
    failed_intervals: AtomicU64,
    truncated_windows: AtomicU64,
    plan_lookups: AtomicU64,
    cache_hits: AtomicU64,
    windows: AtomicU64,
}

impl RunCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// One query attempt sent to the service, retries included.
    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_exhausted(&self) {
        self.exhausted_queries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed_interval(&self) {
        self.failed_intervals.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_truncated_window(&self) {
        self.truncated_windows.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_plan_lookup(&self, hit: bool) {
        self.plan_lookups.fetch_add(1, Ordering::Relaxed);
        if hit {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_windows(&self, count: usize) {
        self.windows.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn exhausted_queries(&self) -> u64 {
        self.exhausted_queries.load(Ordering::Relaxed)
    }

    pub fn failed_intervals(&self) -> u64 {
        self.failed_intervals.load(Ordering::Relaxed)
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    pub(crate) fn snapshot(
        &self,
        intervals: usize,
        total_records: usize,
        disabled_filters: Vec<FilterDimension>,
        elapsed: Duration,
    ) -> RunStatistics {
        RunStatistics {
            intervals,
            windows: self.windows.load(Ordering::Relaxed),
            total_requests: self.requests(),
            total_records: total_records as u64,
            failed_intervals: self.failed_intervals(),
            exhausted_queries: self.exhausted_queries(),
            truncated_windows: self.truncated_windows.load(Ordering::Relaxed),
            plan_lookups: self.plan_lookups.load(Ordering::Relaxed),
            cache_hits: self.cache_hits(),
            disabled_filters,
            elapsed,
        }
    }
}

/// Final statistics of a collection run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunStatistics {
    /// Base intervals the range was split into
    pub intervals: usize,
    /// Windows queried across all base intervals
    pub windows: u64,
    pub total_requests: u64,
    pub total_records: u64,
    pub failed_intervals: u64,
    /// Queries that ran out of retries and came back empty
    pub exhausted_queries: u64,
    /// Windows that still truncated at fetch time (minimum-window limit)
    pub truncated_windows: u64,
    pub plan_lookups: u64,
    pub cache_hits: u64,
    pub disabled_filters: Vec<FilterDimension>,
    pub elapsed: Duration,
}

impl RunStatistics {
    /// Records collected per request issued.
    pub fn efficiency(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.total_records as f64 / self.total_requests as f64
        }
    }

    pub fn cache_hit_ratio(&self) -> f64 {
        if self.plan_lookups == 0 {
            0.0
        } else {
            self.cache_hits as f64 / self.plan_lookups as f64
        }
    }

    /// True when some part of the range may be missing records.
    pub fn is_partial(&self) -> bool {
        self.failed_intervals > 0 || self.exhausted_queries > 0 || self.truncated_windows > 0
    }
}
