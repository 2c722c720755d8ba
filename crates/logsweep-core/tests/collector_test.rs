// Integration tests for the collection orchestrator
//
// Drives the Collector end to end against a deterministic in-memory query
// service that truncates at a fixed row limit, like the real analytics API.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use logsweep_core::{
    CancelFlag, CollectError, Collector, CollectorOptions, FilterDimension, FilterSet, Interval,
    PartitionCache, QueryOptions, QueryService, Record, ServiceError, UnsupportedFilterPolicy,
};
use serde_json::json;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const LIMIT: usize = 100;

/// Sorted synthetic events with optional failure and filter rejection.
struct SyntheticService {
    events: Vec<DateTime<Utc>>,
    failing_hours: HashSet<DateTime<Utc>>,
    rejects: Option<FilterDimension>,
    calls: AtomicUsize,
}

impl SyntheticService {
    fn new(events: Vec<DateTime<Utc>>) -> Self {
        let mut events = events;
        events.sort();
        Self {
            events,
            failing_hours: HashSet::new(),
            rejects: None,
            calls: AtomicUsize::new(0),
        }
    }

    fn failing_hour(mut self, hour: u32) -> Self {
        self.failing_hours.insert(at(hour, 0));
        self
    }

    fn rejecting(mut self, dimension: FilterDimension) -> Self {
        self.rejects = Some(dimension);
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueryService for SyntheticService {
    async fn fetch(
        &self,
        interval: &Interval,
        filters: &FilterSet,
    ) -> Result<Vec<Record>, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(dimension) = self.rejects {
            if filters.is_active(dimension) {
                return Err(ServiceError::UnsupportedField {
                    dimension: Some(dimension),
                    message: format!("unknown field for {}", dimension),
                });
            }
        }

        let hour = interval.start() - ChronoDuration::seconds(interval.start().timestamp() % 3600);
        if self.failing_hours.contains(&hour) {
            return Err(ServiceError::Server { status: 503 });
        }

        Ok(self
            .events
            .iter()
            .filter(|ts| interval.contains(**ts))
            .take(LIMIT)
            .map(|ts| {
                json!({
                    "datetime": ts.to_rfc3339(),
                    "rayName": format!("{:x}", ts.timestamp_millis()),
                })
            })
            .collect())
    }
}

fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 20, hour, minute, 0).unwrap()
}

/// `count` events spread evenly over the hour starting at `hour`.
fn spread(hour: u32, count: usize) -> Vec<DateTime<Utc>> {
    let start = at(hour, 0);
    (0..count)
        .map(|i| start + ChronoDuration::milliseconds(i as i64 * 3_600_000 / count as i64))
        .collect()
}

fn options() -> CollectorOptions {
    CollectorOptions {
        max_concurrency: 2,
        query: QueryOptions {
            server_limit: LIMIT,
            retry_count: 3,
            retry_delay: Duration::ZERO,
            rate_limit_delay: Duration::ZERO,
            request_delay: Duration::ZERO,
        },
        ..CollectorOptions::default()
    }
}

fn range(from_hour: u32, to_hour: u32) -> Interval {
    Interval::new(at(from_hour, 0), at(to_hour, 0)).unwrap()
}

fn two_hour_events() -> Vec<DateTime<Utc>> {
    let mut events = spread(0, 40);
    events.extend(spread(1, 250));
    events
}

#[tokio::test]
async fn test_two_hour_scenario_collects_every_record() {
    let service = Arc::new(SyntheticService::new(two_hour_events()));
    let collector = Collector::new(service.clone(), options()).unwrap();

    let collection = collector
        .run(range(0, 2), FilterSet::new(), &CancelFlag::new())
        .await
        .unwrap();

    assert_eq!(collection.len(), 290);
    let stats = &collection.stats;
    assert_eq!(stats.intervals, 2);
    assert_eq!(stats.total_records, 290);
    assert_eq!(stats.failed_intervals, 0);
    assert_eq!(stats.truncated_windows, 0);
    assert_eq!(stats.exhausted_queries, 0);
    // Hour 1 is a single window, hour 2 needs at least three.
    assert!(stats.windows >= 4);
    assert_eq!(stats.total_requests as usize, service.calls());
    assert!(!stats.is_partial());

    let distinct: HashSet<_> = collection
        .records
        .iter()
        .map(|r| r["rayName"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(distinct.len(), 290);
}

#[tokio::test]
async fn test_failing_interval_is_isolated() {
    let mut events = spread(0, 40);
    events.extend(spread(1, 80));
    events.extend(spread(2, 60));
    let service = Arc::new(SyntheticService::new(events).failing_hour(1));
    let collector = Collector::new(service, options()).unwrap();

    let collection = collector
        .run(range(0, 3), FilterSet::new(), &CancelFlag::new())
        .await
        .unwrap();

    assert_eq!(collection.stats.failed_intervals, 1);
    assert_eq!(collection.stats.exhausted_queries, 1);
    assert_eq!(collection.len(), 100);
    assert!(collection.stats.is_partial());
}

#[tokio::test]
async fn test_every_interval_failing_is_service_unavailable() {
    let service = Arc::new(
        SyntheticService::new(two_hour_events())
            .failing_hour(0)
            .failing_hour(1),
    );
    let collector = Collector::new(service, options()).unwrap();

    let err = collector
        .run(range(0, 2), FilterSet::new(), &CancelFlag::new())
        .await
        .unwrap_err();

    assert_eq!(err, CollectError::ServiceUnavailable { intervals: 2 });
}

#[tokio::test]
async fn test_repeated_runs_are_idempotent() {
    let mut results = Vec::new();
    for _ in 0..2 {
        let service = Arc::new(SyntheticService::new(two_hour_events()));
        let collector = Collector::new(service, options()).unwrap();
        let collection = collector
            .run(range(0, 2), FilterSet::new(), &CancelFlag::new())
            .await
            .unwrap();
        results.push(collection.stats);
    }

    assert_eq!(results[0].total_records, results[1].total_records);
    assert_eq!(results[0].total_requests, results[1].total_requests);
    assert_eq!(results[0].windows, results[1].windows);
    assert_eq!(results[0].failed_intervals, results[1].failed_intervals);
}

#[tokio::test]
async fn test_second_run_reuses_cached_plans() {
    let service = Arc::new(SyntheticService::new(two_hour_events()));
    let cache = Arc::new(PartitionCache::new());
    let collector = Collector::new(service, options())
        .unwrap()
        .with_cache(Arc::clone(&cache));

    let first = collector
        .run(range(0, 2), FilterSet::new(), &CancelFlag::new())
        .await
        .unwrap();
    let second = collector
        .run(range(0, 2), FilterSet::new(), &CancelFlag::new())
        .await
        .unwrap();

    assert_eq!(first.stats.cache_hits, 0);
    assert_eq!(second.stats.cache_hits, 2);
    assert_eq!(second.stats.cache_hit_ratio(), 1.0);
    assert_eq!(second.len(), first.len());
    // Only the window fetches remain once plans are cached.
    assert_eq!(second.stats.total_requests, second.stats.windows);
    assert!(second.stats.total_requests < first.stats.total_requests);
    assert_eq!(cache.len(), 2);
}

#[tokio::test]
async fn test_unsupported_filter_is_disabled_and_interval_retried() {
    let service = Arc::new(SyntheticService::new(two_hour_events()).rejecting(FilterDimension::Country));
    let collector = Collector::new(service, options()).unwrap();
    let filters = FilterSet::new().with_countries(["CN", "HK"]);

    let collection = collector
        .run(range(0, 2), filters, &CancelFlag::new())
        .await
        .unwrap();

    assert_eq!(collection.len(), 290);
    assert_eq!(collection.stats.failed_intervals, 0);
    assert_eq!(collection.stats.disabled_filters, vec![FilterDimension::Country]);
}

#[tokio::test]
async fn test_unsupported_filter_aborts_under_abort_policy() {
    let service = Arc::new(SyntheticService::new(two_hour_events()).rejecting(FilterDimension::RuleId));
    let collector = Collector::new(
        service,
        CollectorOptions {
            on_unsupported_filter: UnsupportedFilterPolicy::Abort,
            ..options()
        },
    )
    .unwrap();

    let err = collector
        .run(
            range(0, 2),
            FilterSet::new().with_rule_id("abc123"),
            &CancelFlag::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CollectError::UnsupportedFilter {
            dimension: FilterDimension::RuleId,
            ..
        }
    ));
}

#[tokio::test]
async fn test_cancelled_run_issues_no_queries() {
    let service = Arc::new(SyntheticService::new(two_hour_events()));
    let collector = Collector::new(service.clone(), options()).unwrap();
    let cancel = CancelFlag::new();
    cancel.cancel();

    let err = collector
        .run(range(0, 2), FilterSet::new(), &cancel)
        .await
        .unwrap_err();

    assert_eq!(err, CollectError::Cancelled);
    assert_eq!(service.calls(), 0);
}

#[tokio::test]
async fn test_sequential_run_is_chronological() {
    let service = Arc::new(SyntheticService::new(two_hour_events()));
    let collector = Collector::new(
        service,
        CollectorOptions {
            max_concurrency: 1,
            ..options()
        },
    )
    .unwrap();

    let collection = collector
        .run(range(0, 2), FilterSet::new(), &CancelFlag::new())
        .await
        .unwrap();

    let stamps: Vec<DateTime<Utc>> = collection
        .records
        .iter()
        .map(|r| {
            DateTime::parse_from_rfc3339(r["datetime"].as_str().unwrap())
                .unwrap()
                .with_timezone(&Utc)
        })
        .collect();
    assert!(stamps.windows(2).all(|pair| pair[0] < pair[1]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_partial_range_clips_both_ends() {
    let service = Arc::new(SyntheticService::new(two_hour_events()));
    let collector = Collector::new(
        service,
        CollectorOptions {
            max_concurrency: 4,
            ..options()
        },
    )
    .unwrap();
    let clipped = Interval::new(at(0, 30), at(1, 30)).unwrap();

    let collection = collector
        .run(clipped, FilterSet::new(), &CancelFlag::new())
        .await
        .unwrap();

    let expected = two_hour_events()
        .into_iter()
        .filter(|ts| clipped.contains(*ts))
        .count();
    assert_eq!(collection.stats.intervals, 2);
    assert_eq!(collection.len(), expected);
}

#[test]
fn test_invalid_options_are_rejected() {
    let service = Arc::new(SyntheticService::new(Vec::new()));
    let result = Collector::new(
        service,
        CollectorOptions {
            base_interval_secs: 0,
            ..options()
        },
    );
    assert!(matches!(result, Err(CollectError::InvalidOptions(_))));
}
