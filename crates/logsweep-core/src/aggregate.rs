//! Result aggregation.

use crate::filter::FilterDimension;
use crate::interval::Interval;
use crate::service::Record;
use crate::stats::{RunCounters, RunStatistics};
use std::time::Duration;

/// Records collected for one base interval.
#[derive(Debug, Clone)]
pub struct IntervalBatch {
    pub interval: Interval,
    pub records: Vec<Record>,
}

/// Final output of a run: all records plus statistics.
///
/// Record order is unspecified across base intervals; within one base
/// interval records follow window order.
#[derive(Debug, Clone)]
pub struct Collection {
    pub records: Vec<Record>,
    pub stats: RunStatistics,
}

impl Collection {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Concatenates per-interval batches. Windows never overlap, so no
/// de-duplication happens here.
#[derive(Debug, Default)]
pub struct Aggregator {
    records: Vec<Record>,
    batches: usize,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, batch: IntervalBatch) {
        self.batches += 1;
        self.records.extend(batch.records);
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn batch_count(&self) -> usize {
        self.batches
    }

    pub fn finish(
        self,
        counters: &RunCounters,
        intervals: usize,
        disabled_filters: Vec<FilterDimension>,
        elapsed: Duration,
    ) -> Collection {
        let stats = counters.snapshot(intervals, self.records.len(), disabled_filters, elapsed);
        Collection {
            records: self.records,
            stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn batch(h: u32, n: usize) -> IntervalBatch {
        IntervalBatch {
            interval: Interval::new(
                Utc.with_ymd_and_hms(2025, 6, 20, h, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2025, 6, 20, h + 1, 0, 0).unwrap(),
            )
            .unwrap(),
            records: (0..n).map(|i| json!({ "hour": h, "i": i })).collect(),
        }
    }

    #[test]
    fn test_concatenates_batches_and_snapshots_stats() {
        let counters = RunCounters::new();
        for _ in 0..5 {
            counters.record_request();
        }

        let mut aggregator = Aggregator::new();
        aggregator.push(batch(2, 7));
        aggregator.push(batch(1, 3));
        assert_eq!(aggregator.record_count(), 10);
        assert_eq!(aggregator.batch_count(), 2);

        let collection = aggregator.finish(&counters, 2, Vec::new(), Duration::from_millis(10));
        assert_eq!(collection.len(), 10);
        assert_eq!(collection.stats.total_records, 10);
        assert_eq!(collection.stats.total_requests, 5);
        assert_eq!(collection.stats.efficiency(), 2.0);
    }
}
