//! Planex Configuration Module
//!
//! Defaults for execution knobs and snapshot persistence.
//! Config is stored in `~/.config/planex/config.toml`.
//!
//! ## Priority Order (highest to lowest)
//!
//! 1. Command-line flags (applied by the binary)
//! 2. Environment variables (`PLANEX_*`)
//! 3. Config file (`~/.config/planex/config.toml`)
//! 4. Defaults

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ast::ExecutionConfig;
use crate::error::{PlanexError, Result};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PlanexConfig {
    /// Defaults for every submitted execution
    #[serde(default)]
    pub execution: ExecutionDefaults,

    #[serde(default)]
    pub persistence: PersistenceConfig,
}

/// `[execution]` section; unset fields keep the built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExecutionDefaults {
    pub max_retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub max_retry_delay_ms: Option<u64>,
    pub enable_rollback: Option<bool>,
    pub continue_on_error: Option<bool>,
    pub parallel_limit: Option<usize>,
    pub timeout_ms: Option<u64>,
}

/// `[persistence]` section
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PersistenceConfig {
    /// NDJSON file receiving every execution snapshot
    pub snapshot_path: Option<PathBuf>,
}

impl PlanexConfig {
    /// Returns `~/.config/planex/` on Unix, `%APPDATA%/planex/` on Windows
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("planex")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Missing file → defaults; malformed file → `ConfigError`
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| PlanexError::ConfigError {
            reason: format!("Failed to read config file: {}", e),
        })?;

        toml::from_str(&content).map_err(|e| PlanexError::ConfigError {
            reason: format!("Failed to parse config file: {}", e),
        })
    }

    /// Write to `path`, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| PlanexError::ConfigError {
                reason: format!("Failed to create config directory: {}", e),
            })?;
        }
        fs::write(path, self.to_toml()?).map_err(|e| PlanexError::ConfigError {
            reason: format!("Failed to write config file: {}", e),
        })
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| PlanexError::ConfigError {
            reason: format!("Failed to serialize config: {}", e),
        })
    }

    /// Merge with environment variables (empty values are ignored)
    pub fn with_env(mut self) -> Result<Self> {
        let exec = &mut self.execution;
        if let Some(v) = env_value("PLANEX_MAX_RETRIES")? {
            exec.max_retries = Some(v);
        }
        if let Some(v) = env_value("PLANEX_RETRY_DELAY_MS")? {
            exec.retry_delay_ms = Some(v);
        }
        if let Some(v) = env_value("PLANEX_PARALLEL_LIMIT")? {
            exec.parallel_limit = Some(v);
        }
        if let Some(v) = env_flag("PLANEX_ENABLE_ROLLBACK")? {
            exec.enable_rollback = Some(v);
        }
        if let Some(v) = env_flag("PLANEX_CONTINUE_ON_ERROR")? {
            exec.continue_on_error = Some(v);
        }
        if let Some(v) = env_value("PLANEX_TIMEOUT_MS")? {
            exec.timeout_ms = Some(v);
        }
        if let Some(v) = env_value::<PathBuf>("PLANEX_SNAPSHOT_PATH")? {
            self.persistence.snapshot_path = Some(v);
        }
        Ok(self)
    }

    /// Effective execution config: configured values over built-in defaults
    pub fn execution_config(&self) -> ExecutionConfig {
        let d = &self.execution;
        let base = ExecutionConfig::default();
        ExecutionConfig {
            max_retries: d.max_retries.unwrap_or(base.max_retries),
            retry_delay_ms: d.retry_delay_ms.unwrap_or(base.retry_delay_ms),
            max_retry_delay_ms: d.max_retry_delay_ms.unwrap_or(base.max_retry_delay_ms),
            enable_rollback: d.enable_rollback.unwrap_or(base.enable_rollback),
            continue_on_error: d.continue_on_error.unwrap_or(base.continue_on_error),
            parallel_execution_limit: d.parallel_limit.unwrap_or(base.parallel_execution_limit),
            timeout_ms: d.timeout_ms.or(base.timeout_ms),
        }
    }
}

fn env_value<T: FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => {
            raw.trim()
                .parse()
                .map(Some)
                .map_err(|e: T::Err| PlanexError::ConfigError {
                    reason: format!("{}={:?}: {}", name, raw, e),
                })
        }
        _ => Ok(None),
    }
}

fn env_flag(name: &str) -> Result<Option<bool>> {
    let Some(raw) = env_value::<String>(name)? else {
        return Ok(None);
    };
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        _ => Err(PlanexError::ConfigError {
            reason: format!("{}={:?}: expected true/false", name, raw),
        }),
    }
}
