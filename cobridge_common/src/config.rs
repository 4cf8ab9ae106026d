//! Configuration loading traits and types.
//!
//! This module provides a standardized way to load the TOML configuration of
//! the cobridge service.
//!
//! # Usage
//!
//! ```rust,no_run
//! use cobridge_common::config::{ConfigLoader, ConfigError, ServiceConfig};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = ServiceConfig::load(Path::new("cobridge.toml"))?;
//!     config.validate()?;
//!     println!("Service: {}", config.shared.service_name);
//!     Ok(())
//! }
//! ```

use crate::consts::{API_NAME, DEFAULT_BACKEND, DEFAULT_CHANNEL_CAPACITY};
use crate::xchg::types::{ValueKind, ValueSlot};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, detailed tracing information.
    Trace,
    /// Debug information useful during development.
    Debug,
    /// General information about application operation.
    #[default]
    Info,
    /// Warning messages for potentially problematic situations.
    Warn,
    /// Error messages for serious problems.
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// Common configuration fields.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "demexco"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Application instance identifier.
    pub service_name: String,
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            service_name: API_NAME.to_string(),
        }
    }
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `service_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// A register value preloaded into the simulation backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterPreset {
    /// Interface number.
    pub itf: u8,
    /// Slave node id.
    pub id: u8,
    /// Object dictionary index.
    pub reg: u16,
    /// Object dictionary sub-index.
    #[serde(default)]
    pub subreg: u8,
    /// Value kind the preset is encoded with.
    #[serde(rename = "type")]
    pub kind: ValueKind,
    /// Initial value.
    #[serde(default)]
    pub value: i64,
    /// Increment the value on every exchange.
    #[serde(default)]
    pub counter: bool,
}

impl RegisterPreset {
    /// Encode the preset value into a slot of its declared kind.
    pub fn slot(&self) -> Result<ValueSlot, ConfigError> {
        ValueSlot::from_i128(self.kind, i128::from(self.value)).map_err(|e| {
            ConfigError::ValidationError(format!(
                "register {}/{}/{:#06x}/{}: {e}",
                self.itf, self.id, self.reg, self.subreg
            ))
        })
    }
}

/// Backend selection and backend-specific settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    /// Registered backend name (e.g. "simulation").
    #[serde(default = "default_backend")]
    pub driver: String,

    /// Fail exchanges touching registers that were never preset.
    #[serde(default)]
    pub strict: bool,

    /// Artificial latency added to every exchange [ms].
    #[serde(default)]
    pub latency_ms: u64,

    /// Preloaded register values.
    #[serde(default)]
    pub registers: Vec<RegisterPreset>,
}

fn default_backend() -> String {
    DEFAULT_BACKEND.to_string()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            driver: default_backend(),
            strict: false,
            latency_ms: 0,
            registers: Vec::new(),
        }
    }
}

/// Event publication settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EventConfig {
    /// Capacity of each subscription's broadcast channel.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Complete service configuration (`cobridge.toml`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Shared fields.
    #[serde(default)]
    pub shared: SharedConfig,
    /// Backend selection.
    #[serde(default)]
    pub backend: BackendConfig,
    /// Event publication.
    #[serde(default)]
    pub events: EventConfig,
}

impl ServiceConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if:
    /// - `service_name` is empty
    /// - the backend driver name is empty
    /// - the channel capacity is zero
    /// - a register preset does not fit its declared kind
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        if self.backend.driver.is_empty() {
            return Err(ConfigError::ValidationError(
                "backend.driver cannot be empty".to_string(),
            ));
        }
        if self.events.channel_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "events.channel_capacity must be positive".to_string(),
            ));
        }
        for preset in &self.backend.registers {
            preset.slot()?;
        }
        Ok(())
    }
}

/// Trait for loading configuration from TOML files.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        Self::parse(&content)
    }

    /// Parse configuration from TOML text.
    fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

// Blanket implementation for all types that implement DeserializeOwned.
impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_log_level_default() {
        assert_eq!(LogLevel::default(), LogLevel::Info);
    }

    #[test]
    fn test_log_level_deserialization() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct TestWrapper {
            level: LogLevel,
        }

        assert_eq!(
            toml::from_str::<TestWrapper>("level = \"trace\"")
                .unwrap()
                .level,
            LogLevel::Trace
        );
        assert_eq!(
            toml::from_str::<TestWrapper>("level = \"warn\"")
                .unwrap()
                .level,
            LogLevel::Warn
        );
        assert!(toml::from_str::<TestWrapper>("level = \"loud\"").is_err());
    }

    #[test]
    fn test_log_level_to_tracing() {
        assert_eq!(tracing::Level::from(LogLevel::Debug), tracing::Level::DEBUG);
        assert_eq!(tracing::Level::from(LogLevel::Error), tracing::Level::ERROR);
    }

    #[test]
    fn test_shared_config_validation_empty_service_name() {
        let config = SharedConfig {
            log_level: LogLevel::Info,
            service_name: "".to_string(),
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_service_config_defaults() {
        let config = ServiceConfig::parse("").unwrap();
        assert_eq!(config.shared.service_name, API_NAME);
        assert_eq!(config.backend.driver, DEFAULT_BACKEND);
        assert_eq!(config.events.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_channel_capacity_rejected() {
        let config = ServiceConfig::parse("[events]\nchannel_capacity = 0\n").unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_preset_out_of_range_rejected() {
        let config = ServiceConfig::parse(
            r#"
[[backend.registers]]
itf = 0
id = 1
reg = 0x6041
type = "u8"
value = 300
"#,
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("0x6041"));
    }

    #[test]
    fn test_config_loader_file_not_found() {
        let result = ServiceConfig::load(Path::new("/nonexistent/path/cobridge.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound)));
    }

    #[test]
    fn test_config_loader_parse_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "invalid toml {{{{").unwrap();

        let result = ServiceConfig::load(file.path());
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }
}
