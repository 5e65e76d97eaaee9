// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `validate` command.
//!
//! Loads the configuration and resolves the connection parameters of every
//! configured device, reporting all problems at once. Nothing is contacted.

use iota_config::{AgentConfig, ConfigLoader};
use iota_core::{resolve, Device};
use serde::Serialize;

use crate::cli::{Cli, OutputFormat, ValidateArgs};
use crate::error::{BinError, BinResult};

/// Validation outcome for one configured device.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceReport {
    /// Device identifier.
    pub device_id: String,
    /// Entity name the device would be published under.
    pub entity_name: String,
    /// Resolved endpoint, if the parameters are valid.
    pub endpoint: Option<String>,
    /// Number of active attributes.
    pub attributes: usize,
    /// Every problem found.
    pub errors: Vec<String>,
}

impl DeviceReport {
    /// Returns true if the device resolved without errors.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Resolves every configured device.
pub fn validate_config(config: &AgentConfig) -> Vec<DeviceReport> {
    config
        .devices
        .iter()
        .map(|entry| {
            let device = Device::from_config(entry, &config.iota);
            let (endpoint, errors) = match resolve(Some(&device.internal_attributes)) {
                Ok(descriptor) => (Some(descriptor.endpoint), Vec::new()),
                Err(errors) => (None, errors.into_iter().collect()),
            };
            DeviceReport {
                device_id: device.id,
                entity_name: device.name,
                endpoint,
                attributes: device.active.len(),
                errors,
            }
        })
        .collect()
}

/// Executes the `validate` command.
pub fn validate(cli: &Cli, args: ValidateArgs) -> BinResult<()> {
    let config_path = &cli.config;

    let config = ConfigLoader::new()
        .load(config_path)
        .map_err(|e| BinError::from(e).with_context(format!("validating {}", config_path.display())))?;

    let reports = validate_config(&config);
    let invalid = reports.iter().filter(|r| !r.is_valid()).count();

    let mut warnings: Vec<String> = Vec::new();
    if config.devices.is_empty() {
        warnings.push("No devices configured".to_string());
    }

    match args.format {
        OutputFormat::Text => {
            if invalid == 0 {
                println!("✓ Configuration is valid: {}", config_path.display());
            } else {
                println!("✗ Configuration has invalid devices: {}", config_path.display());
            }
            println!();
            println!("Summary:");
            println!("  Log level: {}", config.iota.log_level);
            println!(
                "  Context broker: {}:{}",
                config.iota.context_broker.host, config.iota.context_broker.port
            );
            println!("  North port: {}", config.iota.server.port);
            println!("  Service: {} {}", config.iota.service, config.iota.subservice);
            println!("  Devices: {}", reports.len());

            for report in &reports {
                match &report.endpoint {
                    Some(endpoint) => println!(
                        "    ✓ {} ({}) -> {} [{} attributes]",
                        report.device_id, report.entity_name, endpoint, report.attributes
                    ),
                    None => {
                        println!("    ✗ {} ({})", report.device_id, report.entity_name);
                        for error in &report.errors {
                            println!("        {}", error);
                        }
                    }
                }
            }

            if !warnings.is_empty() {
                println!();
                println!("Warnings:");
                for warning in &warnings {
                    println!("  ⚠ {}", warning);
                }
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "valid": invalid == 0,
                "config_path": config_path.display().to_string(),
                "summary": {
                    "log_level": config.iota.log_level,
                    "context_broker": format!(
                        "{}:{}",
                        config.iota.context_broker.host, config.iota.context_broker.port
                    ),
                    "north_port": config.iota.server.port,
                    "device_count": reports.len(),
                },
                "devices": reports,
                "warnings": warnings,
            });
            let text = serde_json::to_string_pretty(&output)
                .map_err(|e| BinError::runtime(format!("cannot render report: {}", e)))?;
            println!("{}", text);
        }
    }

    if invalid > 0 {
        return Err(BinError::config(format!(
            "{} of {} device(s) have invalid connection parameters",
            invalid,
            reports.len()
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use iota_config::DeviceConfig;
    use serde_json::json;

    fn device(id: &str, internal_attributes: serde_json::Value) -> DeviceConfig {
        DeviceConfig {
            device_id: id.to_string(),
            entity_name: String::new(),
            entity_type: "Pump".to_string(),
            service: None,
            subservice: None,
            attributes: Vec::new(),
            internal_attributes,
        }
    }

    #[test]
    fn test_reports_each_device() {
        let mut config = AgentConfig::default();
        config.devices.push(device(
            "pump-1",
            json!({
                "opcuaEndpoint": "opc.tcp://pump:4840",
                "opcuaSecurityMode": "None",
                "opcuaSecurityPolicy": "None"
            }),
        ));
        config.devices.push(device("pump-2", json!({ "opcuaEndpoint": "opc.tcp://pump:4840" })));
        config.devices.push(device("pump-3", serde_json::Value::Null));

        let reports = validate_config(&config);
        assert_eq!(reports.len(), 3);

        assert!(reports[0].is_valid());
        assert_eq!(reports[0].endpoint.as_deref(), Some("opc.tcp://pump:4840"));
        assert_eq!(reports[0].entity_name, "Pump:pump-1");

        assert_eq!(
            reports[1].errors,
            vec![
                "opcuaSecurityMode was expected but it was not provided!".to_string(),
                "opcuaSecurityPolicy was expected but it was not provided!".to_string(),
            ]
        );
        assert_eq!(reports[2].errors, vec!["internalAttributes can't be empty!".to_string()]);
    }

    #[test]
    fn test_validate_command_exit_codes() {
        use clap::Parser;
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::with_suffix(".json").unwrap();
        write!(
            file,
            r#"{{"devices": [{{"device_id": "pump-1", "entity_type": "Pump",
                "internal_attributes": {{"opcuaEndpoint": "opc.tcp://pump:4840"}}}}]}}"#
        )
        .unwrap();

        let path = file.path().to_string_lossy().to_string();
        let cli = Cli::parse_from(["iota-opcua-agent", "-c", path.as_str(), "validate"]);
        let err = validate(&cli, ValidateArgs::default()).unwrap_err();
        assert_eq!(err.exit_code(), 2);

        let cli = Cli::parse_from(["iota-opcua-agent", "-c", "/nonexistent/agent.yaml", "validate"]);
        let err = validate(&cli, ValidateArgs::default()).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
