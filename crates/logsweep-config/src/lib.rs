// logsweep-config - Runtime configuration for the collector
//
// Supports configuration from multiple sources:
// 1. Environment variables (highest priority)
// 2. Config file path from LOGSWEEP_CONFIG env var
// 3. Config file contents from LOGSWEEP_CONFIG_CONTENT env var
// 4. Default config file location (./logsweep.toml)
// 5. Built-in defaults (lowest priority)

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

mod env_overrides;
mod sources;
mod validation;

pub use env_overrides::{apply_env_overrides, EnvSource, ENV_PREFIX};

/// Wall-clock format for `range.start` / `range.end`
pub const LOCAL_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Main runtime configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub range: RangeConfig,

    #[serde(default)]
    pub filters: FilterConfig,

    #[serde(default)]
    pub query: QueryConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub collector: CollectorConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub log: LogConfig,
}

/// Collection time range in local wall-clock time
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RangeConfig {
    pub start: Option<String>,
    pub end: Option<String>,
    /// Offset of the local clock from UTC, in hours
    pub utc_offset_hours: i32,
}

impl RangeConfig {
    pub fn offset(&self) -> Result<FixedOffset> {
        self.utc_offset_hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .with_context(|| {
                format!(
                    "range.utc_offset_hours out of range: {}",
                    self.utc_offset_hours
                )
            })
    }

    /// Convert the configured local range to UTC instants.
    pub fn to_utc(&self) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        let start = self.start.as_deref().context("range.start is required")?;
        let end = self.end.as_deref().context("range.end is required")?;
        let offset = self.offset()?;
        Ok((
            parse_local(start, &offset).context("Invalid range.start")?,
            parse_local(end, &offset).context("Invalid range.end")?,
        ))
    }
}

fn parse_local(value: &str, offset: &FixedOffset) -> Result<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(value.trim(), LOCAL_TIME_FORMAT)
        .with_context(|| format!("expected 'YYYY-MM-DD HH:MM:SS', got '{}'", value))?;
    let local = offset
        .from_local_datetime(&naive)
        .single()
        .with_context(|| format!("ambiguous local time '{}'", value))?;
    Ok(local.with_timezone(&Utc))
}

/// Query predicates
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Host substring; empty means no host filter
    pub host: Option<String>,
    pub rule_id: Option<String>,
    /// Send `rule_id` to the API; otherwise it is ignored
    pub enable_rule_filter: bool,
    /// ISO country codes
    pub countries: Vec<String>,
    pub enable_country_filter: bool,
    pub actions: Vec<String>,
    pub exclude_allow: bool,
}

/// Query client limits and pacing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub server_limit: usize,
    pub retry_count: u32,
    pub retry_delay_secs: u64,
    pub rate_limit_delay_secs: u64,
    pub request_delay_ms: u64,
    pub timeout_secs: u64,
}

impl QueryConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn rate_limit_delay(&self) -> Duration {
        Duration::from_secs(self.rate_limit_delay_secs)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            server_limit: 5000,
            retry_count: 3,
            retry_delay_secs: 5,
            rate_limit_delay_secs: 15,
            request_delay_ms: 800,
            timeout_secs: 30,
        }
    }
}

/// Base interval size and window search bounds, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub base_interval_secs: i64,
    pub min_window_secs: i64,
    pub max_window_secs: i64,
    pub max_iterations: u32,
    pub precision_secs: i64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_interval_secs: 3600,
            min_window_secs: 60,
            max_window_secs: 3600,
            max_iterations: 12,
            precision_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Process base intervals concurrently; `false` runs them one at a time
    pub parallel: bool,
    pub max_concurrency: usize,
    pub progress_every: usize,
    pub on_unsupported_filter: UnsupportedFilterMode,
}

impl CollectorConfig {
    /// Concurrency actually used by the collector.
    pub fn effective_concurrency(&self) -> usize {
        if self.parallel {
            self.max_concurrency
        } else {
            1
        }
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            max_concurrency: 3,
            progress_every: 10,
            on_unsupported_filter: UnsupportedFilterMode::Disable,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnsupportedFilterMode {
    #[default]
    Disable,
    Abort,
}

impl fmt::Display for UnsupportedFilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnsupportedFilterMode::Disable => write!(f, "disable"),
            UnsupportedFilterMode::Abort => write!(f, "abort"),
        }
    }
}

impl std::str::FromStr for UnsupportedFilterMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "disable" => Ok(UnsupportedFilterMode::Disable),
            "abort" => Ok(UnsupportedFilterMode::Abort),
            _ => anyhow::bail!(
                "Unsupported filter policy: {}. Supported: disable, abort",
                s
            ),
        }
    }
}

/// GraphQL analytics API access
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub endpoint: String,
    pub email: String,
    pub api_key: String,
    pub zone_id: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.cloudflare.com/client/v4/graphql".to_string(),
            email: String::new(),
            api_key: String::new(),
            zone_id: String::new(),
        }
    }
}

impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConfig")
            .field("endpoint", &self.endpoint)
            .field("email", &self.email)
            .field("api_key", &"<redacted>")
            .field("zone_id", &self.zone_id)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: "output".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl RuntimeConfig {
    /// Load configuration from all sources with priority, then validate.
    pub fn load() -> Result<Self> {
        let config = sources::load_config()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from all sources without validating, so callers can layer CLI
    /// overrides on top before calling [`RuntimeConfig::validate`].
    pub fn load_unvalidated() -> Result<Self> {
        sources::load_config()
    }

    /// Load from a specific file path (for the CLI `--config` flag), then
    /// apply environment overrides. Not validated.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        sources::load_from_file_path(path)
    }

    /// Parse inline TOML and apply overrides from `env`. Not validated.
    pub fn from_toml_with_env<E: EnvSource>(content: &str, env: &E) -> Result<Self> {
        let mut config: RuntimeConfig =
            toml::from_str(content).context("Failed to parse inline config")?;
        apply_env_overrides(&mut config, env)?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }
}
