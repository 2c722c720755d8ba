// logsweep - Truncation-aware collector for row-limited analytics APIs
//
// Wires the configuration, the GraphQL query service, the collection engine
// and the JSON Lines export together for one run:
// - Local time range converted to UTC and split into base intervals
// - Adaptive windowing below the API row limit
// - Structured logging with tracing
// - Ctrl+C / SIGTERM cancel the run between queries

use anyhow::{Context, Result};
use logsweep_config::RuntimeConfig;
use logsweep_core::{CancelFlag, Collector, ExportSink, RunStatistics};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

mod export;
mod init;

pub use export::JsonLinesSink;
pub use init::{collection_range, collector_options, filter_set, init_service, init_tracing};

/// Run one collection with a resolved, validated configuration.
///
/// Returns the export path, or `None` when no records matched.
pub async fn run_with_config(config: RuntimeConfig) -> Result<Option<PathBuf>> {
    init_tracing(&config);

    let range = collection_range(&config)?;
    let filters = filter_set(&config);
    let service = init_service(&config)?;
    let collector = Collector::new(Arc::new(service), collector_options(&config))
        .context("Invalid collector options")?;

    let cancel = CancelFlag::new();
    let watcher = tokio::spawn(cancel_on_signal(cancel.clone()));

    let outcome = collector.run(range, filters.clone(), &cancel).await;
    watcher.abort();
    let collection = outcome.context("Collection failed")?;

    let sink = JsonLinesSink::new(&config.output.dir, config.range.offset()?, filters);
    let path = sink.export(&collection).context("Failed to write export")?;

    log_summary(&collection.stats, path.as_deref());
    Ok(path)
}

/// Cancel `flag` on Ctrl+C or SIGTERM. In-flight queries finish first.
async fn cancel_on_signal(flag: CancelFlag) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, cancelling collection...");
        },
        _ = terminate => {
            info!("Received SIGTERM, cancelling collection...");
        },
    }
    flag.cancel();
}

fn log_summary(stats: &RunStatistics, path: Option<&Path>) {
    info!("╭─────────────────────────────────────────────────");
    info!("│ Collection complete");
    info!("├─────────────────────────────────────────────────");
    info!("│ API requests: {}", stats.total_requests);
    info!("│ Records collected: {}", stats.total_records);
    info!("│ Base intervals: {} ({} windows)", stats.intervals, stats.windows);
    info!("│ Failed intervals: {}", stats.failed_intervals);
    info!("│ Exhausted queries: {}", stats.exhausted_queries);
    info!("│ Truncated windows: {}", stats.truncated_windows);
    info!(
        "│ Cache hits: {} ({:.0}%)",
        stats.cache_hits,
        stats.cache_hit_ratio() * 100.0
    );
    info!("│ Elapsed: {:.1}s", stats.elapsed.as_secs_f64());
    info!("│ Efficiency: {:.1} records/request", stats.efficiency());
    if !stats.disabled_filters.is_empty() {
        let names: Vec<&str> = stats.disabled_filters.iter().map(|d| d.as_str()).collect();
        info!("│ Disabled filters: {}", names.join(", "));
    }
    match path {
        Some(path) => info!("│ Output file: {}", path.display()),
        None => info!("│ Output file: none (no matching records)"),
    }
    info!("╰─────────────────────────────────────────────────");

    if stats.is_partial() {
        warn!(
            failed_intervals = stats.failed_intervals,
            exhausted_queries = stats.exhausted_queries,
            truncated_windows = stats.truncated_windows,
            "Coverage is partial; some records may be missing"
        );
    }
}
