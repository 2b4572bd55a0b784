//! Configuration management for the throttling engine.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{Result, ThrottleError};
use crate::throttle::{Category, CategoryRegistry, Policy, DEFAULT_WARNING_RATIO};

/// Prefix for environment variable overrides, e.g. `THROTTLE__ENGINE__SHARD_AMOUNT`.
pub const ENV_PREFIX: &str = "THROTTLE";

/// Main configuration for the throttling engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Engine tuning
    #[serde(default)]
    pub engine: EngineConfig,

    /// Per-category policy overrides; categories not listed keep built-in policies
    #[serde(default)]
    pub policies: HashMap<Category, PolicyConfig>,
}

/// Engine tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Number of independently locked counter store partitions (power of two)
    #[serde(default = "default_shard_amount")]
    pub shard_amount: usize,

    /// Reaper wake-up interval in seconds
    #[serde(default = "default_reaper_interval")]
    pub reaper_interval_secs: u64,

    /// Keys examined per reaper batch
    #[serde(default = "default_reaper_batch_size")]
    pub reaper_batch_size: usize,

    /// How long `stop` waits for the reaper to finish, in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            shard_amount: default_shard_amount(),
            reaper_interval_secs: default_reaper_interval(),
            reaper_batch_size: default_reaper_batch_size(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

fn default_shard_amount() -> usize {
    64
}

fn default_reaper_interval() -> u64 {
    60
}

fn default_reaper_batch_size() -> usize {
    512
}

fn default_shutdown_timeout() -> u64 {
    5
}

impl EngineConfig {
    /// Check the tuning values.
    pub fn validate(&self) -> Result<()> {
        if self.shard_amount < 2 || !self.shard_amount.is_power_of_two() {
            return Err(ThrottleError::Config(format!(
                "shard_amount must be a power of two greater than 1, got {}",
                self.shard_amount
            )));
        }
        if self.reaper_interval_secs == 0 {
            return Err(ThrottleError::Config(
                "reaper_interval_secs must be non-zero".to_string(),
            ));
        }
        if self.reaper_batch_size == 0 {
            return Err(ThrottleError::Config(
                "reaper_batch_size must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Policy as written in configuration files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Attempts allowed within one window
    pub max_attempts: u32,
    /// Window length in seconds
    pub window_secs: u64,
    /// Block length in seconds
    pub block_duration_secs: u64,
    /// Fraction of `max_attempts` at which warnings start
    #[serde(default = "default_warning_ratio")]
    pub warning_ratio: f64,
}

fn default_warning_ratio() -> f64 {
    DEFAULT_WARNING_RATIO
}

impl PolicyConfig {
    /// Convert into a validated [`Policy`].
    pub fn to_policy(&self) -> Result<Policy> {
        Policy::new(
            self.max_attempts,
            Duration::from_secs(self.window_secs),
            Duration::from_secs(self.block_duration_secs),
            self.warning_ratio,
        )
    }
}

impl ThrottleConfig {
    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| ThrottleError::Config(format!("Failed to parse throttle config: {}", e)))
    }

    /// Load configuration from a YAML file path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading throttle configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from an optional file, overlaid with environment
    /// variables prefixed with `THROTTLE__` (nested keys separated by `__`).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            info!(path = %path.display(), "Loading throttle configuration");
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: ThrottleConfig = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Build the category registry described by this configuration.
    pub fn registry(&self) -> Result<CategoryRegistry> {
        CategoryRegistry::from_config(&self.policies)
    }

    /// Validate engine settings and every policy.
    pub fn validate(&self) -> Result<()> {
        self.engine.validate()?;
        self.registry().map(|_| ())
    }
}
