//! Collection orchestrator.
//!
//! Splits the global range into aligned base intervals and drives each one
//! through the partition cache, the window finder and the query client on a
//! bounded pool of concurrent tasks. A failing base interval is counted and
//! logged; the run continues with the others.

use crate::aggregate::{Aggregator, Collection, IntervalBatch};
use crate::cache::{Lookup, PartitionCache};
use crate::cancel::CancelFlag;
use crate::client::{QueryClient, QueryOptions};
use crate::error::{CollectError, IntervalError, QueryError};
use crate::filter::{FilterDimension, FilterSet};
use crate::interval::Interval;
use crate::service::QueryService;
use crate::stats::RunCounters;
use crate::window::{SearchOptions, WindowFinder};
use futures::stream::{self, StreamExt};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// What to do when the service rejects a filter dimension mid-run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnsupportedFilterPolicy {
    /// Drop the dimension for the rest of the run and retry the interval
    #[default]
    Disable,
    /// Stop the whole run
    Abort,
}

impl UnsupportedFilterPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disable => "disable",
            Self::Abort => "abort",
        }
    }
}

impl fmt::Display for UnsupportedFilterPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnsupportedFilterPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disable" => Ok(Self::Disable),
            "abort" => Ok(Self::Abort),
            other => Err(format!(
                "unsupported filter policy '{}'; expected 'disable' or 'abort'",
                other
            )),
        }
    }
}

/// Settings for one [`Collector`], consumed once when it is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorOptions {
    /// Base interval length; boundaries are aligned to multiples of it
    pub base_interval_secs: i64,
    /// Base intervals processed concurrently
    pub max_concurrency: usize,
    /// Emit a progress event every this many completed base intervals
    pub progress_every: usize,
    pub on_unsupported_filter: UnsupportedFilterPolicy,
    pub query: QueryOptions,
    pub search: SearchOptions,
}

impl Default for CollectorOptions {
    fn default() -> Self {
        Self {
            base_interval_secs: 3600,
            max_concurrency: 3,
            progress_every: 10,
            on_unsupported_filter: UnsupportedFilterPolicy::Disable,
            query: QueryOptions::default(),
            search: SearchOptions::default(),
        }
    }
}

impl CollectorOptions {
    pub fn validate(&self) -> Result<(), String> {
        if self.base_interval_secs < 1 {
            return Err("base_interval_secs must be at least 1".into());
        }
        if self.max_concurrency == 0 {
            return Err("max_concurrency must be greater than 0".into());
        }
        if self.progress_every == 0 {
            return Err("progress_every must be greater than 0".into());
        }
        if self.query.server_limit == 0 {
            return Err("server_limit must be greater than 0".into());
        }
        if self.query.retry_count == 0 {
            return Err("retry_count must be greater than 0".into());
        }
        self.search.validate()
    }
}

/// Runs collections against one query service.
///
/// The partition cache outlives individual runs, so a second run over the
/// same base intervals and filters reuses the plans of the first.
pub struct Collector {
    service: Arc<dyn QueryService>,
    options: CollectorOptions,
    cache: Arc<PartitionCache>,
}

impl Collector {
    pub fn new(
        service: Arc<dyn QueryService>,
        options: CollectorOptions,
    ) -> Result<Self, CollectError> {
        options.validate().map_err(CollectError::InvalidOptions)?;
        Ok(Self {
            service,
            options,
            cache: Arc::new(PartitionCache::new()),
        })
    }

    /// Share an existing partition cache.
    pub fn with_cache(mut self, cache: Arc<PartitionCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn cache(&self) -> &Arc<PartitionCache> {
        &self.cache
    }

    pub fn options(&self) -> &CollectorOptions {
        &self.options
    }

    /// Collect every record matching `filters` in `range`.
    ///
    /// Per-interval failures are absorbed into the statistics. The run only
    /// fails when every base interval failed, when an unsupported filter hits
    /// the `Abort` policy, or when `cancel` fires.
    pub async fn run(
        &self,
        range: Interval,
        filters: FilterSet,
        cancel: &CancelFlag,
    ) -> Result<Collection, CollectError> {
        let started = Instant::now();
        let intervals = range.split_aligned(self.options.base_interval_secs);
        let total = intervals.len();
        let counters = Arc::new(RunCounters::new());
        let run_cancel = cancel.child();

        info!(
            range = %range,
            intervals = total,
            concurrency = self.options.max_concurrency,
            filters = %filters.signature(),
            "Starting collection"
        );

        let ctx = RunContext {
            client: QueryClient::new(
                Arc::clone(&self.service),
                self.options.query.clone(),
                Arc::clone(&counters),
                run_cancel.clone(),
            ),
            options: &self.options,
            cache: &self.cache,
            active: RwLock::new(ActiveFilters {
                filters,
                disabled: Vec::new(),
            }),
            abort: Mutex::new(None),
            cancel: run_cancel,
        };

        let mut aggregator = Aggregator::new();
        let mut completed = 0usize;
        let mut failed = 0usize;

        let mut outcomes = stream::iter(intervals.iter().map(|base| ctx.collect_interval(*base)))
            .buffer_unordered(self.options.max_concurrency);

        while let Some(outcome) = outcomes.next().await {
            completed += 1;

            match outcome.error {
                None => {
                    info!(
                        interval = %outcome.batch.interval,
                        records = outcome.batch.records.len(),
                        "Base interval complete"
                    );
                }
                Some(IntervalError::Query(QueryError::Cancelled)) => {
                    debug!(interval = %outcome.batch.interval, "Base interval cancelled");
                }
                Some(e) => {
                    failed += 1;
                    counters.record_failed_interval();
                    error!(
                        interval = %outcome.batch.interval,
                        partial_records = outcome.batch.records.len(),
                        error = %e,
                        "Base interval failed"
                    );
                }
            }
            aggregator.push(outcome.batch);

            if completed % self.options.progress_every == 0 || completed == total {
                info!(
                    completed,
                    total,
                    records = aggregator.record_count(),
                    requests = counters.requests(),
                    "Collection progress"
                );
            }
        }
        drop(outcomes);

        if let Some(abort) = ctx.abort.lock().take() {
            return Err(abort);
        }
        if cancel.is_cancelled() {
            warn!(completed, total, "Collection cancelled");
            return Err(CollectError::Cancelled);
        }
        if total > 0 && failed == total {
            return Err(CollectError::ServiceUnavailable { intervals: total });
        }

        let disabled = ctx.active.read().disabled.clone();
        let collection = aggregator.finish(&counters, total, disabled, started.elapsed());

        info!(
            records = collection.stats.total_records,
            requests = collection.stats.total_requests,
            failed_intervals = collection.stats.failed_intervals,
            cache_hits = collection.stats.cache_hits,
            elapsed_ms = collection.stats.elapsed.as_millis() as u64,
            "Collection finished"
        );

        Ok(collection)
    }
}

struct ActiveFilters {
    filters: FilterSet,
    disabled: Vec<FilterDimension>,
}

struct IntervalOutcome {
    batch: IntervalBatch,
    error: Option<IntervalError>,
}

/// State shared by the tasks of one run.
struct RunContext<'a> {
    client: QueryClient,
    options: &'a CollectorOptions,
    cache: &'a PartitionCache,
    active: RwLock<ActiveFilters>,
    abort: Mutex<Option<CollectError>>,
    cancel: CancelFlag,
}

impl RunContext<'_> {
    async fn collect_interval(&self, base: Interval) -> IntervalOutcome {
        loop {
            if self.cancel.is_cancelled() {
                return IntervalOutcome {
                    batch: IntervalBatch {
                        interval: base,
                        records: Vec::new(),
                    },
                    error: Some(QueryError::Cancelled.into()),
                };
            }

            let filters = self.active.read().filters.clone();
            let outcome = self.collect_with(&base, &filters).await;

            let unsupported = match &outcome.error {
                Some(IntervalError::Query(QueryError::UnsupportedFilter { dimension, message })) => {
                    Some((*dimension, message.clone()))
                }
                _ => None,
            };
            let Some((dimension, message)) = unsupported else {
                return outcome;
            };

            match self.options.on_unsupported_filter {
                UnsupportedFilterPolicy::Disable => {
                    if !self.disable(dimension, &filters, &message) {
                        return outcome;
                    }
                    debug!(interval = %base, dimension = %dimension, "Retrying with reduced filters");
                }
                UnsupportedFilterPolicy::Abort => {
                    self.abort(CollectError::UnsupportedFilter { dimension, message });
                    return outcome;
                }
            }
        }
    }

    /// Plan and fetch one base interval under a fixed filter set.
    async fn collect_with(&self, base: &Interval, filters: &FilterSet) -> IntervalOutcome {
        let mut batch = IntervalBatch {
            interval: *base,
            records: Vec::new(),
        };
        let error = self.fetch_windows(base, filters, &mut batch).await.err();
        IntervalOutcome { batch, error }
    }

    async fn fetch_windows(
        &self,
        base: &Interval,
        filters: &FilterSet,
        batch: &mut IntervalBatch,
    ) -> Result<(), IntervalError> {
        let counters = self.client.counters();
        let signature = filters.signature();
        let finder = WindowFinder::new(&self.client, &self.options.search);

        let (plan, lookup) = self
            .cache
            .get_or_compute(base, &signature, || finder.plan(base, filters))
            .await?;
        counters.record_plan_lookup(lookup == Lookup::Hit);
        counters.record_windows(plan.len());
        debug!(
            interval = %base,
            windows = plan.len(),
            cached = lookup == Lookup::Hit,
            "Window plan ready"
        );

        let mut exhausted = None;
        for window in plan.windows() {
            let result = self.client.execute(window, filters).await?;
            if result.exhausted {
                exhausted.get_or_insert(IntervalError::Exhausted { interval: *window });
                continue;
            }
            if result.truncated {
                counters.record_truncated_window();
                warn!(
                    window = %window,
                    count = result.count,
                    "Window still truncated at minimum duration; records may be missing"
                );
            }
            batch.records.extend(result.records);
        }

        match exhausted {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Drop `dimension` from the run's filters. Returns whether a retry can
    /// make progress, i.e. the filters used for the failed attempt carried it.
    fn disable(&self, dimension: FilterDimension, used: &FilterSet, message: &str) -> bool {
        let mut active = self.active.write();
        if active.filters.is_active(dimension) {
            active.filters = active.filters.without(dimension);
            active.disabled.push(dimension);
            warn!(
                dimension = %dimension,
                reason = %message,
                filters = %active.filters.signature(),
                "Filter not supported by the service; disabled for the rest of the run"
            );
            return true;
        }
        used.is_active(dimension)
    }

    fn abort(&self, err: CollectError) {
        let mut slot = self.abort.lock();
        if slot.is_none() {
            error!(error = %err, "Aborting collection");
            *slot = Some(err);
        }
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_parsing() {
        assert_eq!(
            "Disable".parse::<UnsupportedFilterPolicy>().unwrap(),
            UnsupportedFilterPolicy::Disable
        );
        assert_eq!(
            " abort ".parse::<UnsupportedFilterPolicy>().unwrap(),
            UnsupportedFilterPolicy::Abort
        );
        assert!("ignore".parse::<UnsupportedFilterPolicy>().is_err());
    }

    #[test]
    fn test_options_validation() {
        assert!(CollectorOptions::default().validate().is_ok());

        let zero = CollectorOptions {
            max_concurrency: 0,
            ..CollectorOptions::default()
        };
        assert!(zero.validate().is_err());

        let inverted = CollectorOptions {
            search: SearchOptions {
                min_window_secs: 120,
                max_window_secs: 60,
                ..SearchOptions::default()
            },
            ..CollectorOptions::default()
        };
        assert!(inverted.validate().is_err());
    }
}
