//! Engine tuning configuration
//!
//! Timing knobs for the orchestration loops. Values can be overridden
//! from a TOML file at `~/.config/burnish/burnish_config.toml`:
//!
//! ```toml
//! eject_attempts = 5
//! eject_settle_ms = 500
//! reprobe_interval_ms = 250
//! exclusive_retry_ms = 250
//! dma_backoff_ms = 2000
//! checksum_settle_ms = 5000
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration file name
const CONFIG_FILE_NAME: &str = "burnish_config.toml";

/// Application name for the config directory
const APP_NAME: &str = "burnish";

/// Timing knobs for the engine's retry and settle loops
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// How many times to retry ejecting a reluctant medium
    pub eject_attempts: u32,

    /// How long to let the drive settle between eject attempts
    pub eject_settle_ms: u64,

    /// Poll interval while waiting for a reprobed medium to reappear
    pub reprobe_interval_ms: u64,

    /// Poll interval while waiting for exclusive drive access
    pub exclusive_retry_ms: u64,

    /// How long to rest the system after a DMA underrun before retrying
    pub dma_backoff_ms: u64,

    /// How long to let a freshly burnt medium settle before verification
    pub checksum_settle_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            eject_attempts: 5,
            eject_settle_ms: 500,
            reprobe_interval_ms: 250,
            exclusive_retry_ms: 250,
            dma_backoff_ms: 2000,
            checksum_settle_ms: 5000,
        }
    }
}

impl EngineConfig {
    /// Create a config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the eject retry count
    #[must_use]
    pub fn eject_attempts(mut self, attempts: u32) -> Self {
        self.eject_attempts = attempts;
        self
    }

    /// Set the eject settle delay
    #[must_use]
    pub fn eject_settle(mut self, delay: Duration) -> Self {
        self.eject_settle_ms = delay.as_millis() as u64;
        self
    }

    /// Set the reprobe poll interval
    #[must_use]
    pub fn reprobe_interval(mut self, interval: Duration) -> Self {
        self.reprobe_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Set the exclusive-access poll interval
    #[must_use]
    pub fn exclusive_retry(mut self, interval: Duration) -> Self {
        self.exclusive_retry_ms = interval.as_millis() as u64;
        self
    }

    /// Set the DMA backoff delay
    #[must_use]
    pub fn dma_backoff(mut self, delay: Duration) -> Self {
        self.dma_backoff_ms = delay.as_millis() as u64;
        self
    }

    /// Set the post-burn settle delay
    #[must_use]
    pub fn checksum_settle(mut self, delay: Duration) -> Self {
        self.checksum_settle_ms = delay.as_millis() as u64;
        self
    }

    /// Eject settle delay as a [`Duration`]
    pub fn eject_settle_delay(&self) -> Duration {
        Duration::from_millis(self.eject_settle_ms)
    }

    /// Reprobe poll interval as a [`Duration`]
    pub fn reprobe_poll(&self) -> Duration {
        Duration::from_millis(self.reprobe_interval_ms)
    }

    /// Exclusive-access poll interval as a [`Duration`]
    pub fn exclusive_poll(&self) -> Duration {
        Duration::from_millis(self.exclusive_retry_ms)
    }

    /// DMA backoff delay as a [`Duration`]
    pub fn dma_backoff_delay(&self) -> Duration {
        Duration::from_millis(self.dma_backoff_ms)
    }

    /// Post-burn settle delay as a [`Duration`]
    pub fn checksum_settle_delay(&self) -> Duration {
        Duration::from_millis(self.checksum_settle_ms)
    }

    /// Default configuration file path, when a config directory exists
    pub fn default_path() -> Option<PathBuf> {
        dirs_next::config_dir().map(|dir| dir.join(APP_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load from the default path, falling back to defaults when the file
    /// is absent or unreadable
    pub fn load() -> Self {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => {
                tracing::debug!("No config path available, using defaults");
                Self::default()
            }
        }
    }

    /// Load from a specific path, falling back to defaults when the file
    /// is absent or unreadable
    pub fn load_from(path: &std::path::Path) -> Self {
        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    tracing::debug!("Loaded engine config from {:?}", path);
                    config
                }
                Err(err) => {
                    tracing::warn!("Failed to parse config file {:?}: {}", path, err);
                    Self::default()
                }
            },
            Err(err) => {
                tracing::warn!("Failed to read config file {:?}: {}", path, err);
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_config_default() {
        let config = EngineConfig::default();
        assert_eq!(config.eject_attempts, 5);
        assert_eq!(config.eject_settle_delay(), Duration::from_millis(500));
        assert_eq!(config.reprobe_poll(), Duration::from_millis(250));
        assert_eq!(config.dma_backoff_delay(), Duration::from_secs(2));
        assert_eq!(config.checksum_settle_delay(), Duration::from_secs(5));
    }

    #[test]
    fn test_config_builder() {
        let config = EngineConfig::new()
            .eject_attempts(2)
            .dma_backoff(Duration::from_millis(100));
        assert_eq!(config.eject_attempts, 2);
        assert_eq!(config.dma_backoff_delay(), Duration::from_millis(100));
    }

    #[test]
    fn test_load_from_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = EngineConfig::load_from(&dir.path().join("nope.toml"));
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_load_from_partial_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE_NAME);
        let mut file = std::fs::File::create(&path).expect("create");
        writeln!(file, "eject_attempts = 9").expect("write");

        let config = EngineConfig::load_from(&path);
        assert_eq!(config.eject_attempts, 9);
        // untouched fields keep their defaults
        assert_eq!(config.reprobe_interval_ms, 250);
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = EngineConfig::new().eject_attempts(3);
        let text = toml::to_string(&config).expect("serialize");
        let parsed: EngineConfig = toml::from_str(&text).expect("parse");
        assert_eq!(parsed, config);
    }
}
