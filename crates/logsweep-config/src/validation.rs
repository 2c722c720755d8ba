// Configuration validation
//
// Validates that required fields are present and values are sensible

use crate::*;
use anyhow::{bail, Result};
use tracing::warn;

const PLACEHOLDER_EMAIL: &str = "your-email@example.com";
const PLACEHOLDER_API_KEY: &str = "your-global-api-key-here";
const PLACEHOLDER_ZONE_ID: &str = "your-zone-id-here";

/// Ranges longer than this many base intervals get a warning
const LARGE_RANGE_INTERVALS: i64 = 24 * 31;

pub fn validate_config(config: &RuntimeConfig) -> Result<()> {
    validate_api_config(&config.api)?;
    validate_query_config(&config.query)?;
    validate_search_config(&config.search)?;
    validate_collector_config(&config.collector)?;
    validate_range_config(&config.range, &config.search)?;

    if config.output.dir.trim().is_empty() {
        bail!("output.dir must not be empty");
    }

    Ok(())
}

fn validate_api_config(config: &ApiConfig) -> Result<()> {
    if config.endpoint.trim().is_empty() {
        bail!("api.endpoint must not be empty");
    }
    if is_unset(&config.email, PLACEHOLDER_EMAIL) {
        bail!("api.email is required (set CF_EMAIL or LOGSWEEP_API_EMAIL)");
    }
    if is_unset(&config.api_key, PLACEHOLDER_API_KEY) {
        bail!("api.api_key is required (set CF_API_KEY or LOGSWEEP_API_KEY)");
    }
    if is_unset(&config.zone_id, PLACEHOLDER_ZONE_ID) {
        bail!("api.zone_id is required (set CF_ZONE_ID or LOGSWEEP_ZONE_ID)");
    }
    Ok(())
}

fn is_unset(value: &str, placeholder: &str) -> bool {
    let value = value.trim();
    value.is_empty() || value == placeholder
}

fn validate_query_config(config: &QueryConfig) -> Result<()> {
    if config.server_limit == 0 {
        bail!("query.server_limit must be greater than 0");
    }

    if config.retry_count == 0 {
        bail!("query.retry_count must be greater than 0");
    }

    if config.timeout_secs == 0 {
        bail!("query.timeout_secs must be greater than 0");
    }

    if config.request_delay_ms == 0 {
        warn!("query.request_delay_ms is 0; sustained runs may hit the API rate limit");
    }

    Ok(())
}

fn validate_search_config(config: &SearchConfig) -> Result<()> {
    if config.base_interval_secs <= 0 {
        bail!("search.base_interval_secs must be greater than 0");
    }

    if config.min_window_secs <= 0 {
        bail!("search.min_window_secs must be greater than 0");
    }

    if config.min_window_secs > config.max_window_secs {
        bail!(
            "search.min_window_secs ({}) must not exceed search.max_window_secs ({})",
            config.min_window_secs,
            config.max_window_secs
        );
    }

    if config.precision_secs <= 0 {
        bail!("search.precision_secs must be greater than 0");
    }

    if config.max_iterations == 0 {
        bail!("search.max_iterations must be greater than 0");
    }

    if config.max_window_secs > config.base_interval_secs {
        warn!(
            max_window_secs = config.max_window_secs,
            base_interval_secs = config.base_interval_secs,
            "search.max_window_secs exceeds the base interval; windows are clamped to it"
        );
    }

    Ok(())
}

fn validate_collector_config(config: &CollectorConfig) -> Result<()> {
    if config.max_concurrency == 0 {
        bail!("collector.max_concurrency must be greater than 0");
    }

    if config.progress_every == 0 {
        bail!("collector.progress_every must be greater than 0");
    }

    if config.max_concurrency > 16 {
        warn!(
            max_concurrency = config.max_concurrency,
            "collector.max_concurrency is very high; expect rate limiting"
        );
    }

    Ok(())
}

fn validate_range_config(range: &RangeConfig, search: &SearchConfig) -> Result<()> {
    let (start, end) = range.to_utc()?;
    if start >= end {
        bail!(
            "range.start ({}) must be before range.end ({})",
            range.start.as_deref().unwrap_or_default(),
            range.end.as_deref().unwrap_or_default()
        );
    }

    let intervals = (end - start).num_seconds() / search.base_interval_secs.max(1);
    if intervals > LARGE_RANGE_INTERVALS {
        warn!(
            intervals,
            "Time range spans many base intervals; the run may take a long time"
        );
    }

    Ok(())
}
