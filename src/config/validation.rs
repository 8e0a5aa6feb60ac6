//! Validation of the merged configuration.
//!
//! Runs after the file and flag layers are combined and before any resource
//! is acquired, so a bad value never gets as far as opening the bus.

use std::fmt;

use super::Config;
use crate::common::constants::*;

/// Value rejected by [`validate_config`].
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    SeaLevelOutOfRange(f64),
    IntervalOutOfRange(u64),
    EmptyDevice,
    EmptyMqttHost,
    ZeroMqttPort,
    InvalidLocation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::SeaLevelOutOfRange(value) => write!(
                f,
                "sea_level_hpa ({value}) must be between {MINIMUM_SEA_LEVEL_HPA} and {MAXIMUM_SEA_LEVEL_HPA} hPa"
            ),
            ConfigError::IntervalOutOfRange(value) => write!(
                f,
                "interval ({value} s) must be between {MINIMUM_INTERVAL_SECS} and {MAXIMUM_INTERVAL_SECS} seconds"
            ),
            ConfigError::EmptyDevice => f.write_str("device path must not be empty"),
            ConfigError::EmptyMqttHost => f.write_str("mqtt_host must not be empty"),
            ConfigError::ZeroMqttPort => f.write_str("mqtt_port must not be 0"),
            ConfigError::InvalidLocation(location) => write!(
                f,
                "mqtt_location '{location}' must be non-empty and free of '#' and '+'"
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Check every value that is set; unset values fall back to known-good defaults.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if let Some(sea_level) = config.sea_level_hpa
        && !(MINIMUM_SEA_LEVEL_HPA..=MAXIMUM_SEA_LEVEL_HPA).contains(&sea_level)
    {
        return Err(ConfigError::SeaLevelOutOfRange(sea_level));
    }

    if let Some(interval) = config.interval
        && !(MINIMUM_INTERVAL_SECS..=MAXIMUM_INTERVAL_SECS).contains(&interval)
    {
        return Err(ConfigError::IntervalOutOfRange(interval));
    }

    if let Some(device) = &config.device
        && device.as_os_str().is_empty()
    {
        return Err(ConfigError::EmptyDevice);
    }

    if let Some(host) = &config.mqtt_host
        && host.trim().is_empty()
    {
        return Err(ConfigError::EmptyMqttHost);
    }

    if config.mqtt_port == Some(0) {
        return Err(ConfigError::ZeroMqttPort);
    }

    if let Some(location) = &config.mqtt_location
        && !is_valid_location(location)
    {
        return Err(ConfigError::InvalidLocation(location.clone()));
    }

    Ok(())
}

/// A topic root must be publishable: no wildcards, no empty string.
pub fn is_valid_location(location: &str) -> bool {
    !location.is_empty() && !location.contains(['#', '+'])
}
