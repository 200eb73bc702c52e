//! Configuration loader and validator
//!
//! Loads profiler settings from an optional TOML file; command-line flags are
//! applied on top by the binary.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "configs/default.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scan: ScanSettings,

    #[serde(default)]
    pub target: TargetSettings,

    #[serde(default)]
    pub output: OutputSettings,

    #[serde(default)]
    pub connection: ConnectionSettings,
}

/// Scan settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSettings {
    /// Seconds to gather advertisements
    #[serde(default = "default_scan_duration")]
    pub duration_secs: f64,

    /// Adapter to scan on (e.g. "hci0"); default adapter when unset
    #[serde(default)]
    pub adapter: Option<String>,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            duration_secs: default_scan_duration(),
            adapter: None,
        }
    }
}

/// Device to profile once discovered
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetSettings {
    #[serde(default)]
    pub name: Option<String>,

    /// Overrides the name when set
    #[serde(default)]
    pub address: Option<String>,
}

/// Output document locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSettings {
    #[serde(default = "default_scan_path")]
    pub scan_path: PathBuf,

    #[serde(default = "default_profile_path")]
    pub profile_path: PathBuf,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            scan_path: default_scan_path(),
            profile_path: default_profile_path(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    #[serde(default = "default_connect_timeout")]
    pub timeout_secs: f64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_connect_timeout(),
        }
    }
}

fn default_scan_duration() -> f64 { 30.0 }
fn default_connect_timeout() -> f64 { 20.0 }
fn default_scan_path() -> PathBuf { PathBuf::from("config/discovered_devices.json") }
fn default_profile_path() -> PathBuf { PathBuf::from("config/device_profile.json") }

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        info!("Loading configuration from: {}", path_ref.display());

        let content = std::fs::read_to_string(path_ref)?;
        let config: Config = toml::from_str(&content)?;

        debug!("  - Scan duration: {}s", config.scan.duration_secs);
        debug!("  - Adapter: {:?}", config.scan.adapter);
        debug!("  - Target: {:?}", config.target);

        config.validate()?;
        Ok(config)
    }

    /// Load the file if it exists, otherwise fall back to defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        if path_ref.exists() {
            Self::load(path_ref)
        } else {
            debug!("No config file at {}, using defaults", path_ref.display());
            Ok(Self::default())
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_seconds("scan.duration_secs", self.scan.duration_secs)?;
        validate_seconds("connection.timeout_secs", self.connection.timeout_secs)?;

        if self.output.scan_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("output.scan_path must not be empty".into()));
        }
        if self.output.profile_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("output.profile_path must not be empty".into()));
        }
        Ok(())
    }

    pub fn scan_duration(&self) -> Duration {
        Duration::from_secs_f64(self.scan.duration_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.connection.timeout_secs)
    }
}

fn validate_seconds(field: &str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ConfigError::Invalid(format!(
            "{} must be a positive number of seconds (got {})",
            field, value
        )));
    }
    if Duration::try_from_secs_f64(value).is_err() {
        return Err(ConfigError::Invalid(format!(
            "{} is too large to represent as a duration (got {})",
            field, value
        )));
    }
    Ok(())
}
