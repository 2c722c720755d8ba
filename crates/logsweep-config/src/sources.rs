// Configuration source loading.
//
// Priority order:
// 1. Environment variables (LOGSWEEP_* prefix, plus raw CF_* variables)
// 2. Config file path from LOGSWEEP_CONFIG
// 3. Inline config content from LOGSWEEP_CONFIG_CONTENT
// 4. Default config file (./logsweep.toml)
// 5. Built-in defaults

use crate::env_overrides::{self, EnvSource, ENV_PREFIX};
use crate::RuntimeConfig;
use anyhow::{Context, Result};
use std::env;
use std::path::Path;

const DEFAULT_CONFIG_PATH: &str = "./logsweep.toml";

/// Load configuration using native environment/file access.
pub fn load_config() -> Result<RuntimeConfig> {
    let mut config = load_from_file(&StdEnvSource)?.unwrap_or_default();
    env_overrides::apply_env_overrides(&mut config, &StdEnvSource)?;
    Ok(config)
}

fn load_from_file<E: EnvSource>(env: &E) -> Result<Option<RuntimeConfig>> {
    if let Some(path) = env.get("CONFIG") {
        return read_file(Path::new(&path)).map(Some);
    }

    if let Some(content) = env.get("CONFIG_CONTENT") {
        let config: RuntimeConfig = toml::from_str(&content).with_context(|| {
            format!("Failed to parse inline config from {}CONFIG_CONTENT", ENV_PREFIX)
        })?;
        return Ok(Some(config));
    }

    let default_path = Path::new(DEFAULT_CONFIG_PATH);
    if default_path.exists() {
        return read_file(default_path).map(Some);
    }

    Ok(None)
}

fn read_file(path: &Path) -> Result<RuntimeConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Load configuration from a specific file path (for CLI --config flag).
/// Returns error if file doesn't exist or can't be parsed.
pub fn load_from_file_path(path: impl AsRef<Path>) -> Result<RuntimeConfig> {
    let mut config = read_file(path.as_ref())?;
    env_overrides::apply_env_overrides(&mut config, &StdEnvSource)?;
    Ok(config)
}

struct StdEnvSource;

impl EnvSource for StdEnvSource {
    fn get(&self, key: &str) -> Option<String> {
        env::var(format!("{}{}", ENV_PREFIX, key)).ok()
    }

    fn get_raw(&self, key: &str) -> Option<String> {
        env::var(key).ok()
    }
}
