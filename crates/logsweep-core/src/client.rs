//! Query client: one bounded query with retry, throttling and pacing.
//!
//! Every attempt, retries included, increments the run's request counter so
//! the counter reflects real API load. After the retry budget is spent the
//! client returns an empty, non-truncated result flagged `exhausted` instead
//! of an error; callers must check the flag before treating the window as
//! empty.

use crate::cancel::CancelFlag;
use crate::error::{QueryError, ServiceError};
use crate::filter::FilterSet;
use crate::interval::Interval;
use crate::service::{QueryService, Record};
use crate::stats::RunCounters;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Retry and pacing settings for the query client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
    /// Maximum rows the service returns for one query
    pub server_limit: usize,
    /// Total attempts per query (first try included)
    pub retry_count: u32,
    /// Wait between attempts after a transient failure
    pub retry_delay: Duration,
    /// Run-wide pause after an explicit throttling signal
    pub rate_limit_delay: Duration,
    /// Wait after every completed request
    pub request_delay: Duration,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            server_limit: 5000,
            retry_count: 3,
            retry_delay: Duration::from_secs(5),
            rate_limit_delay: Duration::from_secs(15),
            request_delay: Duration::from_millis(800),
        }
    }
}

/// Outcome of one query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub records: Vec<Record>,
    pub count: usize,
    /// The result reached the server limit; more matching records may exist.
    pub truncated: bool,
    /// All attempts failed; `records` is empty but the window is NOT
    /// confirmed empty.
    pub exhausted: bool,
}

impl QueryResult {
    fn from_records(records: Vec<Record>, server_limit: usize) -> Self {
        let count = records.len();
        Self {
            records,
            count,
            truncated: count >= server_limit,
            exhausted: false,
        }
    }

    fn exhausted() -> Self {
        Self {
            exhausted: true,
            ..Self::default()
        }
    }
}

/// Executes queries against a [`QueryService`] for one run.
pub struct QueryClient {
    service: Arc<dyn QueryService>,
    options: QueryOptions,
    counters: Arc<RunCounters>,
    cancel: CancelFlag,
    paused_until: Mutex<Option<Instant>>,
}

impl QueryClient {
    pub fn new(
        service: Arc<dyn QueryService>,
        options: QueryOptions,
        counters: Arc<RunCounters>,
        cancel: CancelFlag,
    ) -> Self {
        Self {
            service,
            options,
            counters,
            cancel,
            paused_until: Mutex::new(None),
        }
    }

    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    pub fn counters(&self) -> &Arc<RunCounters> {
        &self.counters
    }

    /// Run one query over `interval`.
    ///
    /// Transient failures are retried; fatal ones return immediately. A
    /// rejected filter field that maps to a known dimension is reported as
    /// [`QueryError::UnsupportedFilter`] so the caller can drop it.
    pub async fn execute(
        &self,
        interval: &Interval,
        filters: &FilterSet,
    ) -> Result<QueryResult, QueryError> {
        let attempts = self.options.retry_count.max(1);

        for attempt in 1..=attempts {
            if self.cancel.is_cancelled() {
                return Err(QueryError::Cancelled);
            }
            self.wait_for_throttle().await;

            self.counters.record_request();
            let outcome = self.service.fetch(interval, filters).await;
            self.pace().await;

            match outcome {
                Ok(records) => {
                    let result = QueryResult::from_records(records, self.options.server_limit);
                    debug!(
                        interval = %interval,
                        count = result.count,
                        truncated = result.truncated,
                        attempt,
                        "Query completed"
                    );
                    return Ok(result);
                }
                Err(ServiceError::UnsupportedField {
                    dimension: Some(dimension),
                    message,
                }) => {
                    return Err(QueryError::UnsupportedFilter { dimension, message });
                }
                Err(e) if !e.is_transient() => {
                    return Err(QueryError::Fatal(e));
                }
                Err(ServiceError::RateLimited) => {
                    warn!(
                        interval = %interval,
                        attempt,
                        attempts,
                        delay_secs = self.options.rate_limit_delay.as_secs_f64(),
                        "Rate limited; pausing queries"
                    );
                    self.throttle(self.options.rate_limit_delay);
                }
                Err(e) => {
                    warn!(
                        interval = %interval,
                        attempt,
                        attempts,
                        code = e.code(),
                        error = %e,
                        "Transient query failure"
                    );
                    if attempt < attempts && !self.options.retry_delay.is_zero() {
                        tokio::time::sleep(self.options.retry_delay).await;
                    }
                }
            }
        }

        self.counters.record_exhausted();
        warn!(
            interval = %interval,
            attempts,
            "Query retries exhausted; returning empty result"
        );
        Ok(QueryResult::exhausted())
    }

    /// Delay every query issued through this client until `delay` from now.
    fn throttle(&self, delay: Duration) {
        let until = Instant::now() + delay;
        let mut paused = self.paused_until.lock();
        if paused.map_or(true, |current| current < until) {
            *paused = Some(until);
        }
    }

    async fn wait_for_throttle(&self) {
        let until = *self.paused_until.lock();
        if let Some(until) = until {
            if until > Instant::now() {
                tokio::time::sleep_until(until).await;
            }
        }
    }

    async fn pace(&self) {
        if !self.options.request_delay.is_zero() {
            tokio::time::sleep(self.options.request_delay).await;
        }
    }
}
