use anyhow::{Context, Result};
use clap::Parser;
use logsweep_config::RuntimeConfig;
use std::path::PathBuf;

/// Collect every event in a time range from a row-limited analytics API
#[derive(Parser)]
#[command(name = "logsweep")]
#[command(version)]
#[command(about = "Truncation-aware collector for row-limited analytics APIs", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Range start, local time "YYYY-MM-DD HH:MM:SS" (overrides config file)
    #[arg(long, value_name = "TIME")]
    start: Option<String>,

    /// Range end, local time "YYYY-MM-DD HH:MM:SS" (overrides config file)
    #[arg(long, value_name = "TIME")]
    end: Option<String>,

    /// Output directory for the export
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Base intervals processed concurrently; 1 runs sequentially
    #[arg(short = 'j', long, value_name = "N")]
    concurrency: Option<usize>,

    /// Log level: trace, debug, info, warn, error
    #[arg(short = 'v', long, value_name = "LEVEL")]
    log_level: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?
        .block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    // Step 1: Load base configuration
    let mut config = if let Some(config_path) = &cli.config {
        RuntimeConfig::load_from_path(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?
    } else {
        RuntimeConfig::load_unvalidated().context("Failed to load configuration")?
    };

    // Step 2: Apply CLI overrides (highest priority)
    apply_cli_overrides(&mut config, &cli);

    // Step 3: Initialize tracing early so validation warnings show up
    // Note: run_with_config will also call init_tracing, but that's idempotent
    logsweep::init_tracing(&config);

    // Step 4: Validate once; configuration is not re-read during the run
    config.validate().context("Invalid configuration")?;

    // Step 5: Display startup info
    display_startup_info(&config);

    // Step 6: Collect and export
    logsweep::run_with_config(config).await?;
    Ok(())
}

fn apply_cli_overrides(config: &mut RuntimeConfig, cli: &Cli) {
    if let Some(start) = &cli.start {
        config.range.start = Some(start.clone());
    }
    if let Some(end) = &cli.end {
        config.range.end = Some(end.clone());
    }
    if let Some(output) = &cli.output {
        config.output.dir = output.to_string_lossy().to_string();
    }
    if let Some(concurrency) = cli.concurrency {
        config.collector.max_concurrency = concurrency;
        config.collector.parallel = concurrency > 1;
    }
    if let Some(level) = &cli.log_level {
        config.log.level = level.clone();
    }
}

fn display_startup_info(config: &RuntimeConfig) {
    use tracing::info;

    let filters = logsweep::filter_set(config);

    info!("╭─────────────────────────────────────────────────");
    info!("│ logsweep v{}", env!("CARGO_PKG_VERSION"));
    info!("├─────────────────────────────────────────────────");
    info!(
        "│ Range: {} to {} (UTC{:+})",
        config.range.start.as_deref().unwrap_or_default(),
        config.range.end.as_deref().unwrap_or_default(),
        config.range.utc_offset_hours
    );
    info!("│ Zone: {}", config.api.zone_id);
    info!("│ Filters: {}", filters.signature());
    info!(
        "│ Mode: {}",
        if config.collector.effective_concurrency() > 1 {
            "parallel"
        } else {
            "sequential"
        }
    );
    info!(
        "│   - Concurrency: {}",
        config.collector.effective_concurrency()
    );
    info!("│   - Server limit: {}", config.query.server_limit);
    info!(
        "│   - Windows: {}s to {}s (precision {}s, {} iterations)",
        config.search.min_window_secs,
        config.search.max_window_secs,
        config.search.precision_secs,
        config.search.max_iterations
    );
    info!("│ Output directory: {}", config.output.dir);
    info!("│ Log level: {}", config.log.level);
    info!("╰─────────────────────────────────────────────────");
}
