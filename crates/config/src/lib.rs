#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Configuration management for chords
//!
//! This crate handles loading and merging configuration from:
//! - Default values (hard-coded)
//! - Configuration file (TOML)
//! - Environment variables

pub mod pools;

pub use pools::{PoolConfig, PoolKind};

use chords_errors::{ConfigError, Error};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub fairness: FairnessConfig,

    #[serde(default)]
    pub wait: WaitConfig,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pools: Vec<PoolConfig>,
}

/// Which fairness policy arbitrates blocked chords
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FairnessKind {
    #[default]
    BestEffort,
    StrictFifo,
}

impl std::str::FromStr for FairnessKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "best_effort" | "best-effort" => Ok(Self::BestEffort),
            "strict_fifo" | "strict-fifo" | "fifo" => Ok(Self::StrictFifo),
            _ => Err(ConfigError::InvalidValue {
                field: "fairness.policy".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Fairness policy configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FairnessConfig {
    #[serde(default)]
    pub policy: FairnessKind,
    /// Minimum time between two retry passes
    #[serde(default = "default_min_pass_interval_ms")]
    pub min_pass_interval_ms: u64,
}

/// Wait primitive configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WaitConfig {
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// None = wait forever
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

// Default implementations

impl Default for FairnessConfig {
    fn default() -> Self {
        Self {
            policy: FairnessKind::BestEffort,
            min_pass_interval_ms: default_min_pass_interval_ms(),
        }
    }
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            timeout_ms: None,
        }
    }
}

// Default value functions for serde
fn default_min_pass_interval_ms() -> u64 {
    0
}

fn default_initial_backoff_ms() -> u64 {
    1
}

fn default_max_backoff_ms() -> u64 {
    50
}

impl FairnessConfig {
    #[must_use]
    pub fn min_pass_interval(&self) -> Duration {
        Duration::from_millis(self.min_pass_interval_ms)
    }
}

impl WaitConfig {
    #[must_use]
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    #[must_use]
    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

impl Config {
    /// Parse configuration from a TOML string and validate it
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not valid TOML for this schema or
    /// if validation fails.
    pub fn from_toml_str(contents: &str) -> Result<Self, Error> {
        let config: Self = toml::from_str(contents).map_err(ConfigError::from)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or if the file contents
    /// contain invalid TOML syntax that cannot be parsed.
    pub async fn load_from_file(path: &Path) -> Result<Self, Error> {
        let contents = fs::read_to_string(path)
            .await
            .map_err(|_| ConfigError::NotFound {
                path: path.display().to_string(),
            })?;

        let config = Self::from_toml_str(&contents)?;
        tracing::debug!(path = %path.display(), pools = config.pools.len(), "loaded config");
        Ok(config)
    }

    /// Load configuration from an optional path or use defaults
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed
    pub async fn load_or_default(path: Option<&PathBuf>) -> Result<Self, Error> {
        match path {
            Some(config_path) => Self::load_from_file(config_path).await,
            None => Ok(Self::default()),
        }
    }

    /// Merge with environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if environment variables contain invalid values
    /// that cannot be parsed into the expected types.
    pub fn merge_env(&mut self) -> Result<(), Error> {
        // CHORDS_FAIRNESS
        if let Ok(policy) = std::env::var("CHORDS_FAIRNESS") {
            self.fairness.policy = policy.parse().map_err(|_| ConfigError::InvalidValue {
                field: "CHORDS_FAIRNESS".to_string(),
                value: policy,
            })?;
        }

        // CHORDS_MIN_PASS_INTERVAL_MS
        if let Ok(interval) = std::env::var("CHORDS_MIN_PASS_INTERVAL_MS") {
            self.fairness.min_pass_interval_ms =
                interval.parse().map_err(|_| ConfigError::InvalidValue {
                    field: "CHORDS_MIN_PASS_INTERVAL_MS".to_string(),
                    value: interval,
                })?;
        }

        // CHORDS_WAIT_TIMEOUT_MS ("none" disables the timeout)
        if let Ok(timeout) = std::env::var("CHORDS_WAIT_TIMEOUT_MS") {
            self.wait.timeout_ms = if timeout == "none" {
                None
            } else {
                Some(timeout.parse().map_err(|_| ConfigError::InvalidValue {
                    field: "CHORDS_WAIT_TIMEOUT_MS".to_string(),
                    value: timeout,
                })?)
            };
        }

        self.validate()
    }

    /// Check cross-field constraints
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` describing the first violated constraint.
    pub fn validate(&self) -> Result<(), Error> {
        if self.wait.initial_backoff_ms == 0 {
            return Err(ConfigError::Invalid {
                message: "wait.initial_backoff_ms must be greater than zero".to_string(),
            }
            .into());
        }
        if self.wait.max_backoff_ms < self.wait.initial_backoff_ms {
            return Err(ConfigError::Invalid {
                message: format!(
                    "wait.max_backoff_ms ({}) is below wait.initial_backoff_ms ({})",
                    self.wait.max_backoff_ms, self.wait.initial_backoff_ms
                ),
            }
            .into());
        }

        let mut seen = HashSet::new();
        for pool in &self.pools {
            if !seen.insert(pool.class.clone()) {
                return Err(ConfigError::Invalid {
                    message: format!("pool class {} declared twice", pool.class),
                }
                .into());
            }
            pool.validate()?;
        }
        Ok(())
    }

    /// Render the configuration as TOML
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml_string(&self) -> Result<String, Error> {
        toml::to_string_pretty(self)
            .map_err(|e| {
                ConfigError::SerializeError {
                    error: e.to_string(),
                }
            })
            .map_err(Into::into)
    }
}
