//! Configuration module for dropwatch.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//! - CLI argument overrides (applied by the caller)
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `DROPWATCH_` and use double
//! underscores to separate nested levels:
//! - `DROPWATCH_WATCH__RECHECK_INTERVAL_MS=500` sets `watch.recheck_interval_ms`
//! - `DROPWATCH_WATCH__COMPLETION=always` sets `watch.completion`
//! - `DROPWATCH_LOGGING__DEFAULT=debug` sets `logging.default`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::watcher::{ChangeKind, CompletionStrategy};

/// Directory holding the settings file, searched from the current directory upwards.
pub const CONFIG_DIR: &str = ".dropwatch";
const CONFIG_FILE: &str = "settings.toml";
const ENV_PREFIX: &str = "DROPWATCH_";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Watch loop configuration
    #[serde(default)]
    pub watch: WatchConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct WatchConfig {
    /// Event kinds that trigger a completion check
    #[serde(default = "ChangeKind::defaults")]
    pub triggers: Vec<ChangeKind>,

    /// How to decide that a file is fully written
    #[serde(default)]
    pub completion: CompletionStrategy,

    /// Re-check files that were still being written after this many
    /// milliseconds. Unset means wait for the next filesystem event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recheck_interval_ms: Option<u64>,

    /// Capacity of the channel between the native watcher and the loop
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Default level for all modules (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module overrides, e.g. `dropwatch::watcher = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_channel_capacity() -> usize {
    256
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            watch: WatchConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            triggers: ChangeKind::defaults(),
            completion: CompletionStrategy::default(),
            recheck_interval_ms: None,
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl WatchConfig {
    pub fn recheck_interval(&self) -> Option<Duration> {
        self.recheck_interval_ms.map(Duration::from_millis)
    }

    pub fn triggers_on(&self, kind: ChangeKind) -> bool {
        self.triggers.contains(&kind)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(CONFIG_FILE));
        Self::load_from(config_path)
    }

    /// Load configuration from a specific file, still honouring env overrides
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer in config file if it exists
            .merge(Toml::file(path.as_ref()))
            // Double underscore separates nested levels, single underscore
            // stays part of the field name
            .merge(Env::prefixed(ENV_PREFIX).map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
            .map_err(Box::new)
    }

    /// Find the settings file by looking for a `.dropwatch` directory
    /// from the current directory up to the root
    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        current
            .ancestors()
            .map(|ancestor| ancestor.join(CONFIG_DIR))
            .find(|dir| dir.is_dir())
            .map(|dir| dir.join(CONFIG_FILE))
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
