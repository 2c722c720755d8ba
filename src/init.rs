// Initialization utilities
//
// Logging setup and translation of RuntimeConfig into engine options

use anyhow::{Context, Result};
use logsweep_config::{LogFormat, RuntimeConfig, UnsupportedFilterMode};
use logsweep_core::{
    CollectorOptions, FilterSet, Interval, QueryOptions, SearchOptions, UnsupportedFilterPolicy,
};
use logsweep_graphql::{Credentials, FirewallEventsService};

/// Initialize tracing/logging from RuntimeConfig
pub fn init_tracing(config: &RuntimeConfig) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    // Parse log level from config
    let env_filter =
        EnvFilter::try_new(&config.log.level).unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    // Try to set the global subscriber; ignore error if already set (idempotent)
    let _ = match config.log.format {
        LogFormat::Json => {
            tracing::subscriber::set_global_default(registry.with(fmt::layer().json()))
        }
        LogFormat::Text => tracing::subscriber::set_global_default(registry.with(fmt::layer())),
    };
}

/// Active filters for a run. Rule and country predicates are only sent when
/// their enable switches are on.
pub fn filter_set(config: &RuntimeConfig) -> FilterSet {
    let filters = &config.filters;
    let mut set = FilterSet::new()
        .with_actions(&filters.actions)
        .excluding_allow(filters.exclude_allow);

    if let Some(host) = &filters.host {
        set = set.with_host(host.as_str());
    }
    if filters.enable_rule_filter {
        if let Some(rule_id) = &filters.rule_id {
            set = set.with_rule_id(rule_id.as_str());
        }
    }
    if filters.enable_country_filter {
        set = set.with_countries(&filters.countries);
    }
    set
}

pub fn collector_options(config: &RuntimeConfig) -> CollectorOptions {
    CollectorOptions {
        base_interval_secs: config.search.base_interval_secs,
        max_concurrency: config.collector.effective_concurrency(),
        progress_every: config.collector.progress_every,
        on_unsupported_filter: match config.collector.on_unsupported_filter {
            UnsupportedFilterMode::Disable => UnsupportedFilterPolicy::Disable,
            UnsupportedFilterMode::Abort => UnsupportedFilterPolicy::Abort,
        },
        query: QueryOptions {
            server_limit: config.query.server_limit,
            retry_count: config.query.retry_count,
            retry_delay: config.query.retry_delay(),
            rate_limit_delay: config.query.rate_limit_delay(),
            request_delay: config.query.request_delay(),
        },
        search: SearchOptions {
            min_window_secs: config.search.min_window_secs,
            max_window_secs: config.search.max_window_secs,
            max_iterations: config.search.max_iterations,
            precision_secs: config.search.precision_secs,
        },
    }
}

/// The configured local range as a UTC interval.
pub fn collection_range(config: &RuntimeConfig) -> Result<Interval> {
    let (start, end) = config.range.to_utc()?;
    Interval::new(start, end).context("Invalid collection range")
}

pub fn init_service(config: &RuntimeConfig) -> Result<FirewallEventsService> {
    let credentials = Credentials {
        email: config.api.email.clone(),
        api_key: config.api.api_key.clone(),
        zone_id: config.api.zone_id.clone(),
    };
    FirewallEventsService::new(
        config.api.endpoint.clone(),
        credentials,
        config.query.server_limit,
        config.query.timeout(),
    )
    .context("Failed to initialize analytics API client")
}
