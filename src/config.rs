//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::Deserialize;
use serde::de::Error;
use std::fs;
use std::path::Path;

use crate::error::{Result, TrackerError};
use crate::fragment::window::DEFAULT_WINDOW_MS;
use crate::uplink::protocol::HeaderLayout;

/// Longest accepted reassembly window (24 hours)
const MAX_WINDOW_MS: u64 = 86_400_000;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub decoder: DecoderConfig,
    #[serde(default)]
    pub reassembly: ReassemblyConfig,
    #[serde(default)]
    pub publish: PublishConfig,
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Frame decoder configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DecoderConfig {
    #[serde(default = "default_header_layout")]
    pub header_layout: HeaderLayout,
}

/// Fragment reassembly configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ReassemblyConfig {
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
}

/// Publication configuration
#[derive(Debug, Deserialize, Clone)]
pub struct PublishConfig {
    #[serde(default = "default_topic")]
    pub topic: String,

    /// Drop re-publication of the same device_id + timestamp
    #[serde(default = "default_dedupe")]
    pub dedupe: bool,

    #[serde(default = "default_dedupe_capacity")]
    pub dedupe_capacity: usize,
}

/// Geolocation oracle selection
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OracleMode {
    /// No oracle reachable; every resolution fails
    Unavailable,
    /// Fixed answer, for replaying captured traffic offline
    Static,
}

/// Geolocation oracle configuration
#[derive(Debug, Deserialize, Clone)]
pub struct OracleConfig {
    #[serde(default = "default_oracle_mode")]
    pub mode: OracleMode,

    #[serde(default)]
    pub latitude: f64,

    #[serde(default)]
    pub longitude: f64,

    #[serde(default)]
    pub horizontal_accuracy: f64,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for daily rolling log files; empty disables file logging
    #[serde(default)]
    pub directory: String,
}

// Default value functions
fn default_header_layout() -> HeaderLayout { HeaderLayout::Primary }

fn default_window_ms() -> u64 { DEFAULT_WINDOW_MS }

fn default_topic() -> String { "iot/assettracker".to_string() }
fn default_dedupe() -> bool { true }
fn default_dedupe_capacity() -> usize { 4096 }

fn default_oracle_mode() -> OracleMode { OracleMode::Unavailable }

fn default_log_level() -> String { "info".to_string() }

impl Default for DecoderConfig {
    fn default() -> Self {
        Self { header_layout: default_header_layout() }
    }
}

impl Default for ReassemblyConfig {
    fn default() -> Self {
        Self { window_ms: default_window_ms() }
    }
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            topic: default_topic(),
            dedupe: default_dedupe(),
            dedupe_capacity: default_dedupe_capacity(),
        }
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            mode: default_oracle_mode(),
            latitude: 0.0,
            longitude: 0.0,
            horizontal_accuracy: 0.0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: String::new(),
        }
    }
}

fn invalid(message: impl std::fmt::Display) -> TrackerError {
    TrackerError::Config(toml::de::Error::custom(message))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use tracker_uplink::config::Config;
    ///
    /// let config = Config::load("config/tracker.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if self.reassembly.window_ms == 0 || self.reassembly.window_ms > MAX_WINDOW_MS {
            return Err(invalid(format!("window_ms must be between 1 and {}", MAX_WINDOW_MS)));
        }

        if self.publish.topic.trim().is_empty() {
            return Err(invalid("publish topic cannot be empty"));
        }

        if self.publish.dedupe && self.publish.dedupe_capacity == 0 {
            return Err(invalid("dedupe_capacity must be greater than 0 when dedupe is enabled"));
        }

        if self.oracle.mode == OracleMode::Static {
            if !(-90.0..=90.0).contains(&self.oracle.latitude) {
                return Err(invalid("oracle latitude must be between -90 and 90"));
            }

            if !(-180.0..=180.0).contains(&self.oracle.longitude) {
                return Err(invalid("oracle longitude must be between -180 and 180"));
            }

            if self.oracle.horizontal_accuracy.is_nan() || self.oracle.horizontal_accuracy < 0.0 {
                return Err(invalid("oracle horizontal_accuracy must be >= 0"));
            }
        }

        if !["trace", "debug", "info", "warn", "error"].contains(&self.logging.level.as_str()) {
            return Err(invalid("log level must be one of: trace, debug, info, warn, error"));
        }

        Ok(())
    }
}
