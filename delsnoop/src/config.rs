//! Configuration for the delsnoop loader
//!
//! Provides:
//! - Config file discovery (CLI flag, env var, /etc)
//! - TOML parsing with serde
//! - Environment variable overrides
//! - Perf ring sizing

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

use delsnoop_common::RECORD_SIZE;

/// Size the perf mmap is carved into.
const PAGE_SIZE: usize = 4096;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Validation(String),
}

/// Complete loader configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SnoopConfig {
    /// Observer settings
    pub observer: ObserverSettings,

    /// Transport channel settings
    pub channel: ChannelSettings,
}

/// Observer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObserverSettings {
    /// Log level: trace, debug, info, warn, error
    pub log_level: String,

    /// Emit logs as JSON
    pub json_logs: bool,
}

impl Default for ObserverSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// Transport channel settings. The per-CPU ring capacity is the only
/// tunable of the probe itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelSettings {
    /// Per-CPU ring capacity, in records
    pub ring_slots: u32,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self { ring_slots: 1024 }
    }
}

impl SnoopConfig {
    /// Load configuration: discover a file, parse it, apply environment
    /// overrides, validate. Falls back to defaults when no file exists.
    pub fn load(cli_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match Self::discover(cli_path) {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Find a config file, in priority order.
    fn discover(cli_path: Option<&Path>) -> Option<PathBuf> {
        // 1. Explicit CLI path
        if let Some(path) = cli_path {
            if path.exists() {
                return Some(path.to_path_buf());
            }
            warn!("CLI config path does not exist: {}", path.display());
        }

        // 2. DELSNOOP_CONFIG environment variable
        if let Ok(env_path) = std::env::var("DELSNOOP_CONFIG") {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Some(path);
            }
            warn!("DELSNOOP_CONFIG path does not exist: {}", env_path);
        }

        // 3. /etc/delsnoop/config.toml
        let path = PathBuf::from("/etc/delsnoop/config.toml");
        if path.exists() {
            return Some(path);
        }

        None
    }

    /// Parse a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("DELSNOOP_LOG_LEVEL") {
            self.observer.log_level = val;
        }
        if let Ok(val) = std::env::var("DELSNOOP_JSON_LOGS") {
            self.observer.json_logs = val.parse().unwrap_or(self.observer.json_logs);
        }
        if let Ok(val) = std::env::var("DELSNOOP_RING_SLOTS") {
            if let Ok(slots) = val.parse() {
                self.channel.ring_slots = slots;
            }
        }
    }

    /// Validate configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.observer.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::Validation(format!(
                "invalid log level: {}. Must be one of: {:?}",
                self.observer.log_level, valid_levels
            )));
        }

        if self.channel.ring_slots == 0 {
            return Err(ConfigError::Validation(
                "ring_slots cannot be 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Pages to mmap per CPU so the ring holds at least `ring_slots`
    /// records. The perf API requires a power-of-two page count.
    pub fn page_count(&self) -> usize {
        (self.channel.ring_slots as usize * RECORD_SIZE)
            .div_ceil(PAGE_SIZE)
            .next_power_of_two()
    }
}
