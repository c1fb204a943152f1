// SPDX-License-Identifier: MIT

//! Layered TOML configuration with environment-variable overrides (spec
//! §4.9). This is the only place the daemon reads paths from the
//! environment; every other component is handed its configuration as plain
//! arguments.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use dynamo_scheduler::SchedulerConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{field} must be nonzero")]
    Zero { field: &'static str },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct RawConfig {
    idle_backoff_ms: u64,
    drain_timeout_secs: u64,
    termination_grace_secs: u64,
    file_set_cache_capacity: usize,
    registry_endpoint: String,
    inventory_endpoint: String,
    log_filter: String,
}

impl Default for RawConfig {
    fn default() -> Self {
        RawConfig {
            idle_backoff_ms: 500,
            drain_timeout_secs: 30,
            termination_grace_secs: 5,
            file_set_cache_capacity: 100,
            registry_endpoint: String::new(),
            inventory_endpoint: String::new(),
            log_filter: "info".to_string(),
        }
    }
}

/// Validated daemon configuration (spec §4.9).
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub scheduler: SchedulerConfig,
    pub file_set_cache_capacity: usize,
    pub log_filter: String,
}

impl DaemonConfig {
    /// Load from `path` if given, else the default search path, else
    /// built-in defaults (a missing default-search-path file is not an
    /// error; an explicitly named but missing file is).
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let raw = match path {
            Some(path) => read_raw(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => read_raw(&path)?,
                _ => RawConfig::default(),
            },
        };
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        if raw.file_set_cache_capacity == 0 {
            return Err(ConfigError::Zero {
                field: "file_set_cache_capacity",
            });
        }
        if raw.drain_timeout_secs == 0 {
            return Err(ConfigError::Zero {
                field: "drain_timeout_secs",
            });
        }
        if raw.termination_grace_secs == 0 {
            return Err(ConfigError::Zero {
                field: "termination_grace_secs",
            });
        }

        Ok(DaemonConfig {
            scheduler: SchedulerConfig {
                idle_backoff: Duration::from_millis(raw.idle_backoff_ms),
                drain_timeout: Duration::from_secs(raw.drain_timeout_secs),
                termination_grace: Duration::from_secs(raw.termination_grace_secs),
                registry_endpoint: raw.registry_endpoint,
                inventory_endpoint: raw.inventory_endpoint,
            },
            file_set_cache_capacity: raw.file_set_cache_capacity,
            log_filter: raw.log_filter,
        })
    }
}

fn read_raw(path: &Path) -> Result<RawConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// `DYNAMO_CONFIG_DIR > XDG_CONFIG_HOME/dynamo > ~/.config/dynamo`, then
/// `daemon.toml` within it.
fn default_config_path() -> Option<PathBuf> {
    let dir = if let Ok(dir) = std::env::var("DYNAMO_CONFIG_DIR") {
        PathBuf::from(dir)
    } else if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        PathBuf::from(xdg).join("dynamo")
    } else {
        PathBuf::from(std::env::var("HOME").ok()?).join(".config/dynamo")
    };
    Some(dir.join("daemon.toml"))
}
