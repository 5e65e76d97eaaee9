// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration loading and processing.
//!
//! # Loading Pipeline
//!
//! 1. Read the file; the extension picks YAML, TOML or JSON
//! 2. Resolve `${VAR}` / `${VAR:default}` placeholders in the raw text
//! 3. Parse into [`AgentConfig`]
//! 4. Apply `IOTA_*` environment overrides
//! 5. Validate
//!
//! # Environment Variable Override
//!
//! ```text
//! IOTA_LOG_LEVEL=INFO
//! IOTA_TIMESTAMP=false
//! IOTA_CB_HOST=orion
//! IOTA_NORTH_PORT=4061
//! IOTA_OPCUA_MAX_RETRY=10
//! ```

use crate::error::{ConfigError, ConfigResult};
use crate::schema::{AgentConfig, LogFormat, LogLevel, RegistryType};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

// =============================================================================
// ConfigLoader
// =============================================================================

/// Configuration loader.
///
/// # Examples
///
/// ```no_run
/// use iota_config::loader::ConfigLoader;
///
/// let loader = ConfigLoader::new();
/// let config = loader.load("agent.yaml").unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Environment variable prefix.
    env_prefix: String,

    /// Whether placeholders and overrides are applied.
    resolve_env_vars: bool,

    /// Variables consulted before the process environment.
    vars: HashMap<String, String>,
}

impl ConfigLoader {
    /// Creates a new configuration loader with default settings.
    pub fn new() -> Self {
        Self {
            env_prefix: "IOTA".to_string(),
            resolve_env_vars: true,
            vars: HashMap::new(),
        }
    }

    /// Sets the environment variable prefix.
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Enables or disables placeholder resolution and overrides.
    pub fn with_env_vars(mut self, enabled: bool) -> Self {
        self.resolve_env_vars = enabled;
        self
    }

    /// Sets a variable that shadows the process environment.
    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    /// Loads configuration from a file.
    ///
    /// The file format is determined by the file extension:
    /// - `.yaml` or `.yml` - YAML format
    /// - `.toml` - TOML format
    /// - `.json` - JSON format
    pub fn load(&self, path: impl AsRef<Path>) -> ConfigResult<AgentConfig> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        let format = ConfigFormat::from_path(path)?;
        let content = self.read_file(path)?;

        let config = self.load_from_str(&content, format).map_err(|e| match e {
            ConfigError::Serialization { message } => ConfigError::parse(path, message),
            other => other,
        })?;

        info!("Configuration loaded successfully");
        debug!(
            devices = config.devices.len(),
            log_level = %config.iota.log_level,
            "Configuration summary"
        );

        Ok(config)
    }

    /// Loads configuration from a string.
    pub fn load_from_str(&self, content: &str, format: ConfigFormat) -> ConfigResult<AgentConfig> {
        let content = if self.resolve_env_vars {
            self.resolve_env_placeholders(content)?
        } else {
            content.to_string()
        };

        let mut config: AgentConfig = parse_str(&content, format)?;

        if self.resolve_env_vars {
            self.apply_env_overrides(&mut config)?;
        }

        config.validate()?;
        Ok(config)
    }

    fn read_file(&self, path: &Path) -> ConfigResult<String> {
        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))
    }

    fn var(&self, name: &str) -> Option<String> {
        self.vars
            .get(name)
            .cloned()
            .or_else(|| env::var(name).ok())
    }

    /// Resolves environment variable placeholders in content.
    ///
    /// Supports the format: `${VAR_NAME}` or `${VAR_NAME:default}`. An unset
    /// variable without default is an error.
    fn resolve_env_placeholders(&self, content: &str) -> ConfigResult<String> {
        let mut result = String::with_capacity(content.len());
        let mut chars = content.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '$' || chars.peek() != Some(&'{') {
                result.push(c);
                continue;
            }
            chars.next();

            let mut var_content = String::new();
            let mut found_close = false;
            for c in chars.by_ref() {
                if c == '}' {
                    found_close = true;
                    break;
                }
                var_content.push(c);
            }

            if !found_close {
                // No closing brace, keep as-is
                result.push_str("${");
                result.push_str(&var_content);
                continue;
            }

            let (var_name, default_value) = match var_content.split_once(':') {
                Some((name, default)) => (name, Some(default)),
                None => (var_content.as_str(), None),
            };

            match (self.var(var_name), default_value) {
                (Some(value), _) => result.push_str(&value),
                (None, Some(default)) => result.push_str(default),
                (None, None) => return Err(ConfigError::env_var_not_found(var_name)),
            }
        }

        Ok(result)
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&self, config: &mut AgentConfig) -> ConfigResult<()> {
        let iota = &mut config.iota;

        if let Some(value) = self.override_value::<LogLevel>("LOG_LEVEL")? {
            iota.log_level = value;
        }
        if let Some(value) = self.override_with("LOG_FILE", parse_bool)? {
            iota.log_file = value;
        }
        if let Some(value) = self.override_with("TIMESTAMP", parse_bool)? {
            iota.timestamp = value;
        }
        if let Some(value) = self.override_value::<String>("CB_HOST")? {
            iota.context_broker.host = value;
        }
        if let Some(value) = self.override_value::<u16>("CB_PORT")? {
            iota.context_broker.port = value;
        }
        if let Some(value) = self.override_value::<u16>("NORTH_PORT")? {
            iota.server.port = value;
        }
        if let Some(value) = self.override_value::<RegistryType>("REGISTRY_TYPE")? {
            iota.device_registry.registry_type = value;
        }
        if let Some(value) = self.override_value::<String>("SERVICE")? {
            iota.service = value;
        }
        if let Some(value) = self.override_value::<String>("SUBSERVICE")? {
            iota.subservice = value;
        }
        if let Some(value) = self.override_value::<String>("PROVIDER_URL")? {
            iota.provider_url = value;
        }
        if let Some(value) = self.override_value::<String>("DEFAULT_RESOURCE")? {
            iota.default_resource = value;
        }
        if let Some(value) = self.override_value::<u32>("OPCUA_MAX_RETRY")? {
            config.opcua.connection_strategy.max_retry = value;
        }
        if let Some(value) = self.override_value::<LogFormat>("LOG_FORMAT")? {
            config.logging.format = value;
        }

        Ok(())
    }

    fn override_value<T>(&self, key: &str) -> ConfigResult<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.override_with(key, |raw| raw.parse::<T>().map_err(|e| e.to_string()))
    }

    fn override_with<T>(
        &self,
        key: &str,
        parse: impl Fn(&str) -> Result<T, String>,
    ) -> ConfigResult<Option<T>> {
        let name = format!("{}_{}", self.env_prefix, key);
        match self.var(&name) {
            None => Ok(None),
            Some(raw) => {
                debug!(variable = %name, "Applying environment override");
                parse(raw.trim())
                    .map(Some)
                    .map_err(|message| ConfigError::invalid_env_var(name, message))
            }
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// ConfigFormat
// =============================================================================

/// Supported configuration file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML format.
    Yaml,
    /// TOML format.
    Toml,
    /// JSON format.
    Json,
}

impl ConfigFormat {
    /// Determines the format from a file path.
    pub fn from_path(path: &Path) -> ConfigResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());

        match ext.as_deref() {
            Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
            Some("toml") => Ok(ConfigFormat::Toml),
            Some("json") => Ok(ConfigFormat::Json),
            Some(other) => Err(ConfigError::unsupported_format(other)),
            None => Err(ConfigError::unsupported_format("(no extension)")),
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn parse_str<T: DeserializeOwned>(content: &str, format: ConfigFormat) -> ConfigResult<T> {
    match format {
        ConfigFormat::Yaml => yaml_parse(content),
        ConfigFormat::Toml => {
            toml::from_str(content).map_err(|e| ConfigError::serialization(e.to_string()))
        }
        ConfigFormat::Json => {
            serde_json::from_str(content).map_err(|e| ConfigError::serialization(e.to_string()))
        }
    }
}

/// YAML goes through the `config` crate.
fn yaml_parse<T: DeserializeOwned>(content: &str) -> ConfigResult<T> {
    let config = config::Config::builder()
        .add_source(config::File::from_str(content, config::FileFormat::Yaml))
        .build()
        .map_err(|e| ConfigError::serialization(e.to_string()))?;

    config
        .try_deserialize()
        .map_err(|e| ConfigError::serialization(e.to_string()))
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(format!("expected a boolean, got '{}'", other)),
    }
}

// =============================================================================
// Convenience Functions
// =============================================================================

/// Loads configuration from a file with default settings.
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<AgentConfig> {
    ConfigLoader::new().load(path)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    fn create_test_yaml() -> String {
        r#"
iota:
  log_level: INFO
  timestamp: false
  context_broker:
    host: orion
    port: 1026
  service: plant
  subservice: /line1

opcua:
  connection_strategy:
    initial_delay: 500ms
    max_retry: 3
    max_delay: 4s
  monitoring:
    sampling_interval: 250ms

logging:
  format: json
"#
        .to_string()
    }

    fn write_temp(content: &str, suffix: &str) -> NamedTempFile {
        let mut file = NamedTempFile::with_suffix(suffix).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_yaml() {
        let file = write_temp(&create_test_yaml(), ".yaml");

        let config = ConfigLoader::new().load(file.path()).unwrap();
        assert_eq!(config.iota.log_level, LogLevel::Info);
        assert!(!config.iota.timestamp);
        assert_eq!(config.iota.context_broker.host, "orion");
        assert_eq!(config.iota.service, "plant");
        assert_eq!(config.iota.server.port, 4061);
        assert_eq!(config.opcua.connection_strategy.max_retry, 3);
        assert_eq!(
            config.opcua.connection_strategy.initial_delay,
            Duration::from_millis(500)
        );
        assert_eq!(
            config.opcua.monitoring.sampling_interval,
            Duration::from_millis(250)
        );
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_load_toml() {
        let toml = r#"
[iota]
log_level = "VERBOSE"
default_type = "Tank"

[opcua.subscription]
publishing_interval = "2s"
"#;
        let file = write_temp(toml, ".toml");

        let config = ConfigLoader::new().load(file.path()).unwrap();
        assert_eq!(config.iota.log_level, LogLevel::Verbose);
        assert_eq!(config.iota.default_type, "Tank");
        assert_eq!(
            config.opcua.subscription.publishing_interval,
            Duration::from_secs(2)
        );
    }

    #[test]
    fn test_load_json_with_devices() {
        let json = r#"{
  "devices": [{
    "device_id": "plc-1",
    "entity_type": "Tank",
    "attributes": [{"object_id": "ns&eq3&sci&eq1001", "name": "level", "type": "Number"}],
    "internal_attributes": {
      "opcuaEndpoint": "opc.tcp://plc-1:4840",
      "opcuaSecurityMode": "None",
      "opcuaSecurityPolicy": "None"
    }
  }]
}"#;
        let config = ConfigLoader::new()
            .load_from_str(json, ConfigFormat::Json)
            .unwrap();
        let device = config.get_device("plc-1").unwrap();
        assert_eq!(device.attributes[0].attr_type, "Number");
        assert_eq!(
            device.internal_attributes["opcuaEndpoint"],
            "opc.tcp://plc-1:4840"
        );
    }

    #[test]
    fn test_file_not_found() {
        let result = ConfigLoader::new().load("/nonexistent/agent.yaml");
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
    }

    #[test]
    fn test_unsupported_format() {
        let file = write_temp("iota: {}", ".ini");
        let result = ConfigLoader::new().load(file.path());
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat { .. })));
    }

    #[test]
    fn test_placeholders() {
        let loader = ConfigLoader::new().with_var("IOTA_TEST_CB_HOST", "broker.local");
        let resolved = loader
            .resolve_env_placeholders("host: ${IOTA_TEST_CB_HOST}\nport: ${IOTA_TEST_UNSET_PORT:1026}")
            .unwrap();
        assert_eq!(resolved, "host: broker.local\nport: 1026");

        let result = loader.resolve_env_placeholders("host: ${IOTA_TEST_UNSET_HOST_VAR}");
        assert!(matches!(result, Err(ConfigError::EnvVarNotFound { .. })));

        let unclosed = loader.resolve_env_placeholders("x: ${OPEN").unwrap();
        assert_eq!(unclosed, "x: ${OPEN");
    }

    #[test]
    fn test_env_overrides() {
        let loader = ConfigLoader::new()
            .with_env_prefix("IOTA_TEST_OVR")
            .with_var("IOTA_TEST_OVR_LOG_LEVEL", "silly")
            .with_var("IOTA_TEST_OVR_CB_PORT", "2026")
            .with_var("IOTA_TEST_OVR_TIMESTAMP", "off")
            .with_var("IOTA_TEST_OVR_OPCUA_MAX_RETRY", "8")
            .with_var("IOTA_TEST_OVR_LOG_FORMAT", "compact");

        let config = loader.load_from_str("{}", ConfigFormat::Json).unwrap();
        assert_eq!(config.iota.log_level, LogLevel::Silly);
        assert_eq!(config.iota.context_broker.port, 2026);
        assert!(!config.iota.timestamp);
        assert_eq!(config.opcua.connection_strategy.max_retry, 8);
        assert_eq!(config.logging.format, LogFormat::Compact);
    }

    #[test]
    fn test_invalid_env_override() {
        let loader = ConfigLoader::new()
            .with_env_prefix("IOTA_TEST_BAD")
            .with_var("IOTA_TEST_BAD_NORTH_PORT", "not-a-port");

        let result = loader.load_from_str("{}", ConfigFormat::Json);
        assert!(matches!(result, Err(ConfigError::InvalidEnvVar { .. })));
    }

    #[test]
    fn test_validation_runs_after_overrides() {
        let loader = ConfigLoader::new()
            .with_env_prefix("IOTA_TEST_ZERO")
            .with_var("IOTA_TEST_ZERO_NORTH_PORT", "0");

        let result = loader.load_from_str("{}", ConfigFormat::Json);
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_parse_error_names_file() {
        let file = write_temp("{ not json", ".json");
        match ConfigLoader::new().load(file.path()) {
            Err(ConfigError::Parse { path, .. }) => assert_eq!(path, file.path()),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
