use crate::{LogFormat, RuntimeConfig, UnsupportedFilterMode};
use anyhow::{anyhow, Context, Result};

pub const ENV_PREFIX: &str = "LOGSWEEP_";

/// Abstraction over environment-variable lookups so tests can inject their
/// own source of overrides.
pub trait EnvSource {
    fn get(&self, key: &str) -> Option<String>;

    /// Get an environment variable WITHOUT the LOGSWEEP_ prefix
    /// Used for the collector's established CF_* variables
    fn get_raw(&self, key: &str) -> Option<String>;
}

/// Apply environment-variable overrides (highest priority) to the runtime config.
///
/// Raw `CF_*` variables are applied first so `LOGSWEEP_*` wins when both are set.
pub fn apply_env_overrides<E: EnvSource>(config: &mut RuntimeConfig, env: &E) -> Result<()> {
    apply_raw_overrides(config, env)?;

    // Range
    if let Some(start) = get_env_string(env, "RANGE_START") {
        config.range.start = Some(start);
    }
    if let Some(end) = get_env_string(env, "RANGE_END") {
        config.range.end = Some(end);
    }
    if let Some(offset) = get_env_i32(env, "UTC_OFFSET_HOURS")? {
        config.range.utc_offset_hours = offset;
    }

    // Filters
    if let Some(host) = get_env_string(env, "HOST") {
        config.filters.host = Some(host);
    }
    if let Some(rule_id) = get_env_string(env, "RULE_ID") {
        config.filters.rule_id = Some(rule_id);
    }
    if let Some(val) = get_env_bool(env, "ENABLE_RULE_FILTER")? {
        config.filters.enable_rule_filter = val;
    }
    if let Some(countries) = get_env_string(env, "COUNTRIES") {
        config.filters.countries = split_list(&countries);
    }
    if let Some(val) = get_env_bool(env, "ENABLE_COUNTRY_FILTER")? {
        config.filters.enable_country_filter = val;
    }
    if let Some(actions) = get_env_string(env, "ACTIONS") {
        config.filters.actions = split_list(&actions);
    }
    if let Some(val) = get_env_bool(env, "EXCLUDE_ALLOW")? {
        config.filters.exclude_allow = val;
    }

    // Query client
    if let Some(val) = get_env_usize(env, "SERVER_LIMIT")? {
        config.query.server_limit = val;
    }
    if let Some(val) = get_env_u32(env, "RETRY_COUNT")? {
        config.query.retry_count = val;
    }
    if let Some(val) = get_env_u64(env, "RETRY_DELAY_SECS")? {
        config.query.retry_delay_secs = val;
    }
    if let Some(val) = get_env_u64(env, "RATE_LIMIT_DELAY_SECS")? {
        config.query.rate_limit_delay_secs = val;
    }
    if let Some(val) = get_env_u64(env, "REQUEST_DELAY_MS")? {
        config.query.request_delay_ms = val;
    }
    if let Some(val) = get_env_u64(env, "TIMEOUT_SECS")? {
        config.query.timeout_secs = val;
    }

    // Window search
    if let Some(val) = get_env_i64(env, "BASE_INTERVAL_SECS")? {
        config.search.base_interval_secs = val;
    }
    if let Some(val) = get_env_i64(env, "MIN_WINDOW_SECS")? {
        config.search.min_window_secs = val;
    }
    if let Some(val) = get_env_i64(env, "MAX_WINDOW_SECS")? {
        config.search.max_window_secs = val;
    }
    if let Some(val) = get_env_u32(env, "MAX_ITERATIONS")? {
        config.search.max_iterations = val;
    }
    if let Some(val) = get_env_i64(env, "PRECISION_SECS")? {
        config.search.precision_secs = val;
    }

    // Collector
    if let Some(val) = get_env_bool(env, "PARALLEL")? {
        config.collector.parallel = val;
    }
    if let Some(val) = get_env_usize(env, "MAX_CONCURRENCY")? {
        config.collector.max_concurrency = val;
    }
    if let Some(val) = get_env_usize(env, "PROGRESS_EVERY")? {
        config.collector.progress_every = val;
    }
    if let Some(mode) = get_env_string(env, "ON_UNSUPPORTED_FILTER") {
        config.collector.on_unsupported_filter = mode
            .parse::<UnsupportedFilterMode>()
            .context("Invalid LOGSWEEP_ON_UNSUPPORTED_FILTER value")?;
    }

    // API
    if let Some(endpoint) = get_env_string(env, "API_ENDPOINT") {
        config.api.endpoint = endpoint;
    }
    if let Some(email) = get_env_string(env, "API_EMAIL") {
        config.api.email = email;
    }
    if let Some(key) = get_env_string(env, "API_KEY") {
        config.api.api_key = key;
    }
    if let Some(zone_id) = get_env_string(env, "ZONE_ID") {
        config.api.zone_id = zone_id;
    }

    // Output and logging
    if let Some(dir) = get_env_string(env, "OUTPUT_DIR") {
        config.output.dir = dir;
    }
    if let Some(level) = get_env_string(env, "LOG_LEVEL") {
        config.log.level = level;
    }
    if let Some(format) = get_env_string(env, "LOG_FORMAT") {
        config.log.format = match format.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Text,
        };
    }

    Ok(())
}

fn apply_raw_overrides<E: EnvSource>(config: &mut RuntimeConfig, env: &E) -> Result<()> {
    if let Some(email) = env.get_raw("CF_EMAIL") {
        config.api.email = email;
    }
    if let Some(key) = env.get_raw("CF_API_KEY") {
        config.api.api_key = key;
    }
    if let Some(zone_id) = env.get_raw("CF_ZONE_ID") {
        config.api.zone_id = zone_id;
    }
    if let Some(host) = env.get_raw("CF_TARGET_HOST") {
        config.filters.host = Some(host);
    }
    if let Some(rule_id) = env.get_raw("CF_RULE_ID") {
        config.filters.rule_id = Some(rule_id);
    }
    if let Some(countries) = env.get_raw("CF_COUNTRIES") {
        config.filters.countries = split_list(&countries);
    }
    if let Some(val) = parse_raw_bool(env, "CF_ENABLE_RULE_FILTER")? {
        config.filters.enable_rule_filter = val;
    }
    if let Some(val) = parse_raw_bool(env, "CF_ENABLE_COUNTRY_FILTER")? {
        config.filters.enable_country_filter = val;
    }
    if let Some(val) = parse_raw_bool(env, "CF_ENABLE_PARALLEL")? {
        config.collector.parallel = val;
    }
    Ok(())
}

/// Comma-separated list, trimmed, empty entries dropped.
fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn get_env_string<E: EnvSource>(env: &E, key: &str) -> Option<String> {
    env.get(key)
}

fn parse_env<E: EnvSource, T>(env: &E, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match get_env_string(env, key) {
        Some(val) => {
            let parsed = val
                .trim()
                .parse::<T>()
                .map_err(|e| anyhow!("Failed to parse {}{}: {}", ENV_PREFIX, key, e))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

fn get_env_usize<E: EnvSource>(env: &E, key: &str) -> Result<Option<usize>> {
    parse_env(env, key)
}

fn get_env_u32<E: EnvSource>(env: &E, key: &str) -> Result<Option<u32>> {
    parse_env(env, key)
}

fn get_env_u64<E: EnvSource>(env: &E, key: &str) -> Result<Option<u64>> {
    parse_env(env, key)
}

fn get_env_i32<E: EnvSource>(env: &E, key: &str) -> Result<Option<i32>> {
    parse_env(env, key)
}

fn get_env_i64<E: EnvSource>(env: &E, key: &str) -> Result<Option<i64>> {
    parse_env(env, key)
}

fn get_env_bool<E: EnvSource>(env: &E, key: &str) -> Result<Option<bool>> {
    match get_env_string(env, key) {
        Some(val) => parse_bool(&val)
            .map(Some)
            .ok_or_else(|| anyhow!("Failed to parse {}{} (expected bool): {}", ENV_PREFIX, key, val)),
        None => Ok(None),
    }
}

fn parse_raw_bool<E: EnvSource>(env: &E, key: &str) -> Result<Option<bool>> {
    match env.get_raw(key) {
        Some(val) => parse_bool(&val)
            .map(Some)
            .ok_or_else(|| anyhow!("Failed to parse {} (expected bool): {}", key, val)),
        None => Ok(None),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MapEnv {
        prefixed: HashMap<String, String>,
        raw: HashMap<String, String>,
    }

    impl MapEnv {
        fn with(mut self, key: &str, value: &str) -> Self {
            self.prefixed.insert(key.to_string(), value.to_string());
            self
        }

        fn with_raw(mut self, key: &str, value: &str) -> Self {
            self.raw.insert(key.to_string(), value.to_string());
            self
        }
    }

    impl EnvSource for MapEnv {
        fn get(&self, key: &str) -> Option<String> {
            self.prefixed.get(key).cloned()
        }

        fn get_raw(&self, key: &str) -> Option<String> {
            self.raw.get(key).cloned()
        }
    }

    #[test]
    fn test_prefixed_overrides() {
        let env = MapEnv::default()
            .with("SERVER_LIMIT", "100")
            .with("MAX_CONCURRENCY", "8")
            .with("PARALLEL", "false")
            .with("COUNTRIES", "cn, hk,,sg")
            .with("ON_UNSUPPORTED_FILTER", "abort")
            .with("LOG_FORMAT", "JSON");
        let mut config = RuntimeConfig::default();
        apply_env_overrides(&mut config, &env).unwrap();

        assert_eq!(config.query.server_limit, 100);
        assert_eq!(config.collector.max_concurrency, 8);
        assert!(!config.collector.parallel);
        assert_eq!(config.filters.countries, vec!["cn", "hk", "sg"]);
        assert_eq!(config.collector.on_unsupported_filter, UnsupportedFilterMode::Abort);
        assert_eq!(config.log.format, LogFormat::Json);
    }

    #[test]
    fn test_raw_credentials_are_read_and_prefixed_wins() {
        let env = MapEnv::default()
            .with_raw("CF_EMAIL", "ops@example.com")
            .with_raw("CF_API_KEY", "raw-key")
            .with_raw("CF_ZONE_ID", "zone-1")
            .with_raw("CF_ENABLE_COUNTRY_FILTER", "true")
            .with("API_KEY", "prefixed-key");
        let mut config = RuntimeConfig::default();
        apply_env_overrides(&mut config, &env).unwrap();

        assert_eq!(config.api.email, "ops@example.com");
        assert_eq!(config.api.api_key, "prefixed-key");
        assert_eq!(config.api.zone_id, "zone-1");
        assert!(config.filters.enable_country_filter);
    }

    #[test]
    fn test_invalid_values_are_reported() {
        let mut config = RuntimeConfig::default();
        let env = MapEnv::default().with("RETRY_COUNT", "three");
        let err = apply_env_overrides(&mut config, &env).unwrap_err();
        assert!(err.to_string().contains("LOGSWEEP_RETRY_COUNT"));

        let env = MapEnv::default().with("PARALLEL", "maybe");
        assert!(apply_env_overrides(&mut config, &env).is_err());
    }
}
