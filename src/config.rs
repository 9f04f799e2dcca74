//! Configuration system using Figment.
//!
//! This module provides strongly-typed configuration loading.
//! Configuration is loaded from:
//! 1. config.toml file (base configuration)
//! 2. Environment variables (prefixed with THERMOSCAN_)
//!
//! # Example
//! ```no_run
//! use thermoscan::config::Config;
//!
//! # fn main() -> Result<(), figment::Error> {
//! let config = Config::load()?;
//! println!("Application: {}", config.application.name);
//! # Ok(())
//! # }
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Acquisition pipeline settings
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
    /// Instrument connection settings
    #[serde(default)]
    pub instrument: InstrumentConfig,
    /// Report assembly settings
    #[serde(default)]
    pub report: ReportConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            application: ApplicationConfig::default(),
            acquisition: AcquisitionConfig::default(),
            instrument: InstrumentConfig::default(),
            report: ReportConfig::default(),
        }
    }
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_app_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            log_level: default_log_level(),
        }
    }
}

/// Acquisition pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Producer sleep between instrument reads. The actual sampling period is
    /// this interval plus the instrument's scan latency.
    #[serde(with = "humantime_serde", default = "default_poll_interval")]
    pub poll_interval: Duration,
    /// Consumer tick draining the sample queue into history.
    #[serde(with = "humantime_serde", default = "default_drain_interval")]
    pub drain_interval: Duration,
    /// Bounded sample queue capacity; the producer drops on overflow.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Per-channel point count above which post-run downsampling is offered.
    #[serde(default = "default_downsample_threshold")]
    pub downsample_threshold: usize,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            drain_interval: default_drain_interval(),
            queue_capacity: default_queue_capacity(),
            downsample_threshold: default_downsample_threshold(),
        }
    }
}

/// Instrument connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentConfig {
    /// Host name or IP address of the scanner's LAN interface.
    #[serde(default = "default_address")]
    pub address: String,
    /// TCP port of the instrument's raw-socket service.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Timeout applied to each query round-trip.
    #[serde(with = "humantime_serde", default = "default_read_timeout")]
    pub read_timeout: Duration,
    /// Thermocouple type configured on every scanned channel.
    #[serde(default = "default_thermocouple")]
    pub thermocouple_type: String,
    /// Integration time in power-line cycles.
    #[serde(default = "default_nplc")]
    pub nplc: f64,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
            read_timeout: default_read_timeout(),
            thermocouple_type: default_thermocouple(),
            nplc: default_nplc(),
        }
    }
}

/// Report assembly configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Channels per plot group; `None` (or 0 at the boundary) plots all
    /// requested channels in one graph.
    #[serde(default)]
    pub channels_per_graph: Option<usize>,
    /// Directory report artifacts are written into.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            channels_per_graph: None,
            output_dir: default_output_dir(),
        }
    }
}

// Default value functions
fn default_app_name() -> String {
    "thermoscan".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_drain_interval() -> Duration {
    Duration::from_millis(200)
}

fn default_queue_capacity() -> usize {
    64
}

fn default_downsample_threshold() -> usize {
    5000
}

fn default_address() -> String {
    "192.168.0.2".to_string()
}

fn default_port() -> u16 {
    1394
}

fn default_read_timeout() -> Duration {
    Duration::from_secs(20)
}

fn default_thermocouple() -> String {
    "K".to_string()
}

fn default_nplc() -> f64 {
    1.0
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

impl Config {
    /// Load configuration from config/config.toml and environment variables
    ///
    /// Environment variables can override configuration with prefix THERMOSCAN_
    /// Example: THERMOSCAN_APPLICATION_LOG_LEVEL=debug
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from("config/config.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("THERMOSCAN_").split("_"))
            .extract()
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        // Validate log level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            ));
        }

        if self.acquisition.queue_capacity == 0 {
            return Err("queue_capacity must be greater than 0".to_string());
        }

        if self.acquisition.poll_interval.is_zero() {
            return Err("poll_interval must be greater than 0".to_string());
        }

        if self.acquisition.drain_interval.is_zero() {
            return Err("drain_interval must be greater than 0".to_string());
        }

        // Keithley 27xx accepts 0.01..=60 power-line cycles
        if !(0.01..=60.0).contains(&self.instrument.nplc) {
            return Err(format!(
                "nplc {} is outside the supported range 0.01..=60",
                self.instrument.nplc
            ));
        }

        if self.instrument.thermocouple_type.is_empty() {
            return Err("thermocouple_type cannot be empty".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.acquisition.queue_capacity, 64);
        assert_eq!(config.acquisition.downsample_threshold, 5000);
        assert_eq!(config.acquisition.drain_interval, Duration::from_millis(200));
    }

    #[test]
    fn rejects_unknown_log_level() {
        let mut config = Config::default();
        config.application.log_level = "verbose".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.contains("log_level"));
    }

    #[test]
    fn rejects_zero_queue_capacity() {
        let mut config = Config::default();
        config.acquisition.queue_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_poll_interval() {
        let mut config = Config::default();
        config.acquisition.poll_interval = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_nplc() {
        let mut config = Config::default();
        config.instrument.nplc = 100.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn loads_from_toml_fragment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
                [application]
                log_level = "debug"

                [acquisition]
                poll_interval = "250ms"
                queue_capacity = 16
            "#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.application.log_level, "debug");
        assert_eq!(config.acquisition.poll_interval, Duration::from_millis(250));
        assert_eq!(config.acquisition.queue_capacity, 16);
        // untouched sections fall back to defaults
        assert_eq!(config.instrument.thermocouple_type, "K");
    }
}
