// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration schema definitions for the agent.
//!
//! # Schema Structure
//!
//! ```text
//! AgentConfig
//! ├── iota: IotaConfig            (framework settings)
//! │   ├── context_broker
//! │   ├── server
//! │   └── device_registry
//! ├── opcua: ClientSettings       (shared by every pooled client)
//! ├── devices: Vec<DeviceConfig>  (statically provisioned devices)
//! └── logging: LoggingConfig
//! ```

use crate::error::{ConfigError, ConfigResult};
use iota_opcua::ClientSettings;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Constants
// =============================================================================

/// Default context broker port.
pub const DEFAULT_CONTEXT_BROKER_PORT: u16 = 1026;

/// Default northbound port.
pub const DEFAULT_NORTH_PORT: u16 = 4061;

// =============================================================================
// Top-Level Configuration
// =============================================================================

/// The root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Framework settings.
    #[serde(default)]
    pub iota: IotaConfig,

    /// OPC UA client settings.
    #[serde(default)]
    pub opcua: ClientSettings,

    /// Statically provisioned devices.
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,

    /// Logging output settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AgentConfig {
    /// Validates the entire configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        self.iota.validate()?;
        self.opcua.validate()?;

        let mut device_ids = HashSet::new();
        for device in &self.devices {
            if !device_ids.insert(device.device_id.as_str()) {
                return Err(ConfigError::duplicate_device_id(&device.device_id));
            }
            device.validate()?;
        }

        Ok(())
    }

    /// Returns a device configuration by ID.
    pub fn get_device(&self, device_id: &str) -> Option<&DeviceConfig> {
        self.devices.iter().find(|d| d.device_id == device_id)
    }
}

// =============================================================================
// Framework Configuration
// =============================================================================

/// Settings consumed by the IoT agent framework.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IotaConfig {
    /// Framework log level.
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,

    /// Also write JSON logs under `logs/`.
    #[serde(default)]
    pub log_file: bool,

    /// Append a `TimeInstant` attribute to every update.
    #[serde(default = "default_true")]
    pub timestamp: bool,

    /// Context broker location.
    #[serde(default)]
    pub context_broker: ContextBrokerConfig,

    /// Northbound server.
    #[serde(default)]
    pub server: ServerConfig,

    /// Device registry backend.
    #[serde(default)]
    pub device_registry: DeviceRegistryConfig,

    /// Default service.
    #[serde(default = "default_service")]
    pub service: String,

    /// Default subservice.
    #[serde(default = "default_subservice")]
    pub subservice: String,

    /// URL announced in context registrations.
    #[serde(default = "default_provider_url")]
    pub provider_url: String,

    /// ISO 8601 duration of device registrations.
    #[serde(default = "default_registration_duration")]
    pub device_registration_duration: String,

    /// Entity type used when a device has none.
    #[serde(default = "default_type")]
    pub default_type: String,

    /// Default resource path.
    #[serde(default = "default_resource")]
    pub default_resource: String,
}

fn default_log_level() -> LogLevel {
    LogLevel::Debug
}

fn default_true() -> bool {
    true
}

fn default_service() -> String {
    "howtoService".to_string()
}

fn default_subservice() -> String {
    "/howto".to_string()
}

fn default_provider_url() -> String {
    "http://localhost:4061".to_string()
}

fn default_registration_duration() -> String {
    "P20Y".to_string()
}

fn default_type() -> String {
    "Thing".to_string()
}

fn default_resource() -> String {
    "/iot/opcua".to_string()
}

impl Default for IotaConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_file: false,
            timestamp: true,
            context_broker: ContextBrokerConfig::default(),
            server: ServerConfig::default(),
            device_registry: DeviceRegistryConfig::default(),
            service: default_service(),
            subservice: default_subservice(),
            provider_url: default_provider_url(),
            device_registration_duration: default_registration_duration(),
            default_type: default_type(),
            default_resource: default_resource(),
        }
    }
}

impl IotaConfig {
    /// Validates the framework settings.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.context_broker.host.trim().is_empty() {
            return Err(ConfigError::validation("iota.context_broker.host", "cannot be empty"));
        }
        if self.context_broker.port == 0 {
            return Err(ConfigError::validation("iota.context_broker.port", "must be non-zero"));
        }
        if self.server.port == 0 {
            return Err(ConfigError::validation("iota.server.port", "must be non-zero"));
        }
        if !self.subservice.starts_with('/') {
            return Err(ConfigError::validation("iota.subservice", "must start with '/'"));
        }
        if self.default_type.trim().is_empty() {
            return Err(ConfigError::validation("iota.default_type", "cannot be empty"));
        }
        Ok(())
    }
}

/// Context broker location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextBrokerConfig {
    /// Host name.
    #[serde(default = "default_cb_host")]
    pub host: String,

    /// Port.
    #[serde(default = "default_cb_port")]
    pub port: u16,
}

fn default_cb_host() -> String {
    "localhost".to_string()
}

fn default_cb_port() -> u16 {
    DEFAULT_CONTEXT_BROKER_PORT
}

impl Default for ContextBrokerConfig {
    fn default() -> Self {
        Self {
            host: default_cb_host(),
            port: DEFAULT_CONTEXT_BROKER_PORT,
        }
    }
}

/// Northbound server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listening port.
    #[serde(default = "default_north_port")]
    pub port: u16,
}

fn default_north_port() -> u16 {
    DEFAULT_NORTH_PORT
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_NORTH_PORT,
        }
    }
}

/// Device registry settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRegistryConfig {
    /// Registry backend.
    #[serde(rename = "type", default)]
    pub registry_type: RegistryType,
}

/// Device registry backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryType {
    /// Transient in-process registry.
    #[default]
    Memory,
}

impl FromStr for RegistryType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            other => Err(ConfigError::validation(
                "iota.device_registry.type",
                format!("unsupported registry '{}', expected 'memory'", other),
            )),
        }
    }
}

// =============================================================================
// Device Configuration
// =============================================================================

/// A statically provisioned device.
///
/// Same shape as a provisioning request. `internal_attributes` carries the
/// connection parameters (`opcuaEndpoint`, `opcuaSecurityMode`, ...) as an
/// object or as an array of objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Unique device identifier.
    pub device_id: String,

    /// Entity name. Derived from type and id when empty.
    #[serde(default)]
    pub entity_name: String,

    /// Entity type. `iota.default_type` when empty.
    #[serde(default)]
    pub entity_type: String,

    /// Service override.
    #[serde(default)]
    pub service: Option<String>,

    /// Subservice override.
    #[serde(default)]
    pub subservice: Option<String>,

    /// Active attributes.
    #[serde(default)]
    pub attributes: Vec<AttributeConfig>,

    /// Connection parameters.
    #[serde(default)]
    pub internal_attributes: serde_json::Value,
}

impl DeviceConfig {
    /// Validates the device entry.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.device_id.trim().is_empty() {
            return Err(ConfigError::validation("devices.device_id", "cannot be empty"));
        }
        for attribute in &self.attributes {
            if attribute.object_id.trim().is_empty() {
                return Err(ConfigError::validation(
                    format!("devices.{}.attributes.object_id", self.device_id),
                    "cannot be empty",
                ));
            }
            if attribute.name.trim().is_empty() {
                return Err(ConfigError::validation(
                    format!("devices.{}.attributes.name", self.device_id),
                    "cannot be empty",
                ));
            }
        }
        Ok(())
    }
}

/// One active attribute of a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeConfig {
    /// Escaped node identifier.
    pub object_id: String,

    /// Attribute name on the entity.
    pub name: String,

    /// Attribute type on the entity.
    #[serde(rename = "type", default = "default_attribute_type")]
    pub attr_type: String,
}

fn default_attribute_type() -> String {
    "string".to_string()
}

// =============================================================================
// Logging Configuration
// =============================================================================

/// Logging output configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log format.
    #[serde(default)]
    pub format: LogFormat,
}

/// Framework log level.
///
/// Accepts `SILLY`, `DEBUG`, `VERBOSE`, `INFO`, `WARN` and `ERROR` in any
/// case, plus `trace` as an alias of `SILLY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LogLevel {
    /// Most verbose.
    Silly,
    /// Debug messages.
    #[default]
    Debug,
    /// Between debug and info.
    Verbose,
    /// Informational messages.
    Info,
    /// Warnings.
    Warn,
    /// Errors only.
    Error,
}

impl LogLevel {
    /// Returns the framework name of the level.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Silly => "SILLY",
            LogLevel::Debug => "DEBUG",
            LogLevel::Verbose => "VERBOSE",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }

    /// Returns the matching `tracing` filter directive.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Silly => "trace",
            LogLevel::Debug | LogLevel::Verbose => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "silly" | "trace" => Ok(LogLevel::Silly),
            "debug" => Ok(LogLevel::Debug),
            "verbose" => Ok(LogLevel::Verbose),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(ConfigError::validation(
                "iota.log_level",
                format!(
                    "unknown level '{}', expected one of SILLY, DEBUG, VERBOSE, INFO, WARN, ERROR",
                    other
                ),
            )),
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, ConfigError> {
        value.parse()
    }
}

impl From<LogLevel> for String {
    fn from(level: LogLevel) -> Self {
        level.as_str().to_string()
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Pretty format for development.
    #[default]
    Pretty,
    /// Compact format.
    Compact,
    /// JSON format for production.
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(ConfigError::validation(
                "logging.format",
                format!("unknown format '{}', expected pretty, compact or json", other),
            )),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AgentConfig::default();
        assert_eq!(config.iota.log_level, LogLevel::Debug);
        assert!(config.iota.timestamp);
        assert_eq!(config.iota.context_broker.port, 1026);
        assert_eq!(config.iota.server.port, 4061);
        assert_eq!(config.iota.service, "howtoService");
        assert_eq!(config.iota.subservice, "/howto");
        assert_eq!(config.iota.default_type, "Thing");
        assert_eq!(config.iota.default_resource, "/iot/opcua");
        assert_eq!(config.iota.device_registry.registry_type, RegistryType::Memory);
        assert_eq!(config.opcua.connection_strategy.max_retry, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_log_level_parsing() {
        assert_eq!("SILLY".parse::<LogLevel>().unwrap(), LogLevel::Silly);
        assert_eq!("verbose".parse::<LogLevel>().unwrap(), LogLevel::Verbose);
        assert_eq!("Warn".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert!("loud".parse::<LogLevel>().is_err());

        assert_eq!(LogLevel::Silly.as_filter(), "trace");
        assert_eq!(LogLevel::Verbose.as_filter(), "debug");
    }

    #[test]
    fn test_log_level_serde() {
        let level: LogLevel = serde_json::from_str("\"info\"").unwrap();
        assert_eq!(level, LogLevel::Info);
        assert_eq!(serde_json::to_string(&LogLevel::Silly).unwrap(), "\"SILLY\"");
    }

    #[test]
    fn test_log_level_try_from_string() {
        assert_eq!(LogLevel::try_from("error".to_string()).unwrap(), LogLevel::Error);
        assert!(matches!(
            LogLevel::try_from("loud".to_string()),
            Err(ConfigError::Validation { .. })
        ));
    }

    #[test]
    fn test_duplicate_device_ids_rejected() {
        let device = DeviceConfig {
            device_id: "plc-1".into(),
            entity_name: String::new(),
            entity_type: String::new(),
            service: None,
            subservice: None,
            attributes: vec![],
            internal_attributes: serde_json::Value::Null,
        };
        let config = AgentConfig {
            devices: vec![device.clone(), device],
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateDeviceId { .. })
        ));
    }

    #[test]
    fn test_zero_port_rejected() {
        let mut config = AgentConfig::default();
        config.iota.server.port = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_opcua_settings_validated() {
        let mut config = AgentConfig::default();
        config.opcua.connection_strategy.max_retry = 0;
        match config.validate() {
            Err(ConfigError::Validation { field, .. }) => assert_eq!(field, "opcua.max_retry"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_attribute_type_defaults_to_string() {
        let attribute: AttributeConfig =
            serde_json::from_str(r#"{"object_id": "ns=3;i=1", "name": "level"}"#).unwrap();
        assert_eq!(attribute.attr_type, "string");
    }
}
