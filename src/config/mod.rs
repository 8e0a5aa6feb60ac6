//! Configuration system for the weather-board daemon.
//!
//! Values come from three layers, later layers winning:
//!
//! 1. compiled-in defaults from [`crate::common::constants`]
//! 2. an optional TOML file named with `-c <path>`
//! 3. command-line flags
//!
//! ```toml
//! device = "/dev/i2c-1"     # Bus device shared by both sensor chips
//! format = "json"           # "text" or "json"
//! output = "/var/log/weather.json"  # File path, or "-" for standard output
//! sea_level_hpa = 1024.25   # Reference for the altitude estimate (300-1200) hPa
//! interval = 20             # Seconds between samples (1-3600)
//! foreground = false        # Stay attached to the terminal
//!
//! mqtt_host = "broker.lan"  # Enables publishing when set
//! mqtt_port = 1883
//! mqtt_location = "home"    # Topic root: <location>/weather/<metric>
//! ```
//!
//! Unknown keys are rejected so a typo never silently falls back to a default.
//! The merged result is validated once and frozen into a [`RunConfig`].

pub mod loading;
pub mod validation;

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::common::constants::*;
use crate::output::{Destination, OutputFormat};

pub use loading::load_from_path;
pub use validation::{ConfigError, validate_config};

/// One configuration layer. Every field is optional so layers can be merged.
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub device: Option<PathBuf>,
    pub format: Option<OutputFormat>,
    pub output: Option<String>,
    pub sea_level_hpa: Option<f64>,
    pub interval: Option<u64>,
    pub foreground: Option<bool>,
    pub mqtt_host: Option<String>,
    pub mqtt_port: Option<u16>,
    pub mqtt_location: Option<String>,
}

impl Config {
    /// Overlay `other` on top of `self`; values set in `other` win.
    pub fn merge(self, other: Config) -> Config {
        Config {
            device: other.device.or(self.device),
            format: other.format.or(self.format),
            output: other.output.or(self.output),
            sea_level_hpa: other.sea_level_hpa.or(self.sea_level_hpa),
            interval: other.interval.or(self.interval),
            foreground: other.foreground.or(self.foreground),
            mqtt_host: other.mqtt_host.or(self.mqtt_host),
            mqtt_port: other.mqtt_port.or(self.mqtt_port),
            mqtt_location: other.mqtt_location.or(self.mqtt_location),
        }
    }
}

/// Broker the daemon publishes to.
#[derive(Debug, Clone, PartialEq)]
pub struct MqttTarget {
    pub host: String,
    pub port: u16,
    /// Topic root.
    pub location: String,
}

/// Settings for one run of the daemon, fixed after startup.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub device: PathBuf,
    pub format: OutputFormat,
    pub destination: Destination,
    pub sea_level_hpa: f64,
    pub interval: Duration,
    pub verbosity: u8,
    /// Unset, this follows the destination: standard output stays attached.
    pub foreground: bool,
    pub mqtt: Option<MqttTarget>,
}

impl RunConfig {
    /// Validate `config` and fill the gaps with defaults.
    ///
    /// A relative output path is anchored at `invocation_dir`, because a
    /// detached daemon changes its working directory before opening it.
    pub fn resolve(
        config: Config,
        verbosity: u8,
        invocation_dir: &Path,
    ) -> Result<RunConfig, ConfigError> {
        validate_config(&config)?;

        let destination = match config.output.as_deref() {
            None => Destination::Stdout,
            Some(value) => match Destination::parse(value) {
                Destination::File(path) if path.is_relative() => {
                    Destination::File(invocation_dir.join(path))
                }
                other => other,
            },
        };

        let foreground = config
            .foreground
            .unwrap_or(destination == Destination::Stdout);

        let mqtt = config.mqtt_host.map(|host| MqttTarget {
            host,
            port: config.mqtt_port.unwrap_or(DEFAULT_MQTT_PORT),
            location: config
                .mqtt_location
                .unwrap_or_else(|| DEFAULT_MQTT_LOCATION.to_string()),
        });

        Ok(RunConfig {
            device: config
                .device
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DEVICE)),
            format: config.format.unwrap_or_default(),
            destination,
            sea_level_hpa: config.sea_level_hpa.unwrap_or(DEFAULT_SEA_LEVEL_HPA),
            interval: Duration::from_secs(config.interval.unwrap_or(DEFAULT_INTERVAL_SECS)),
            verbosity,
            foreground,
            mqtt,
        })
    }

    /// Log the effective settings at startup.
    pub fn log_summary(&self) {
        log_block_start!("Configuration:");
        log_indented!("Device: {}", self.device.display());
        log_indented!("Format: {}", self.format);
        log_indented!("Output: {}", self.destination);
        log_indented!("Interval: {}s", self.interval.as_secs());
        log_indented!("Sea level reference: {:.2} hPa", self.sea_level_hpa);
        match &self.mqtt {
            Some(target) => log_indented!(
                "Publishing to {}:{} under {}/weather/",
                target.host,
                target.port,
                target.location
            ),
            None => log_indented!("Publishing disabled"),
        }
    }
}

#[cfg(test)]
mod tests;
