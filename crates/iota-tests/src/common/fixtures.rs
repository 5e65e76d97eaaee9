// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Test Fixtures
//!
//! Device payloads and configuration files shared by the integration
//! suites.

use serde_json::{json, Value as JsonValue};

use iota_config::{AgentConfig, AttributeConfig, DeviceConfig};
use iota_core::Device;

// =============================================================================
// Endpoint Fixtures
// =============================================================================

/// First test endpoint.
pub const E1: &str = "opc.tcp://plc-1.factory:4840";

/// Second test endpoint.
pub const E2: &str = "opc.tcp://plc-2.factory:4840";

/// Escaped form of `ns=3;i=1001`.
pub const LEVEL_NODE: &str = "ns&eq3&sci&eq1001";

/// Escaped form of `ns=3;i=1002`.
pub const TEMPERATURE_NODE: &str = "ns&eq3&sci&eq1002";

/// Escaped form of `ns=3;s=Pump(1).Speed`.
pub const SPEED_NODE: &str = "ns&eq3&scs&eqPump&lp1&rp.Speed";

// =============================================================================
// Internal Attribute Fixtures
// =============================================================================

/// Fixture providing internal attribute payloads.
pub struct AttributeFixtures;

impl AttributeFixtures {
    /// Unsecured connection to `endpoint`.
    pub fn unsecured(endpoint: &str) -> JsonValue {
        json!({
            "opcuaEndpoint": endpoint,
            "opcuaSecurityMode": "None",
            "opcuaSecurityPolicy": "None"
        })
    }

    /// Signed connection to `endpoint` with credentials.
    pub fn signed(endpoint: &str, user_name: &str, password: &str) -> JsonValue {
        json!({
            "opcuaEndpoint": endpoint,
            "opcuaSecurityMode": "SignAndEncrypt",
            "opcuaSecurityPolicy": "Basic256Sha256",
            "opcuaCredentials": { "userName": user_name, "password": password }
        })
    }

    /// The three required attributes with `omitted` left out.
    pub fn without(omitted: &[&str]) -> JsonValue {
        let mut attributes = Self::unsecured(E1);
        if let Some(object) = attributes.as_object_mut() {
            for key in omitted {
                object.remove(*key);
            }
        }
        attributes
    }
}

// =============================================================================
// Device Fixtures
// =============================================================================

/// Fixture providing provisioning payloads.
pub struct DeviceFixtures;

impl DeviceFixtures {
    /// A tank with level and temperature on `endpoint`.
    pub fn tank(id: &str, endpoint: &str) -> Device {
        Device::new(id, "Tank")
            .with_attribute(LEVEL_NODE, "level", "Number")
            .with_attribute(TEMPERATURE_NODE, "temperature", "Number")
            .with_internal_attributes(AttributeFixtures::unsecured(endpoint))
    }

    /// A pump with a string-identified speed node on `endpoint`.
    pub fn pump(id: &str, endpoint: &str) -> Device {
        Device::new(id, "Pump")
            .with_attribute(SPEED_NODE, "speed", "Number")
            .with_internal_attributes(AttributeFixtures::unsecured(endpoint))
    }

    /// A device whose internal attributes are `internal_attributes`.
    pub fn with_internal(id: &str, internal_attributes: JsonValue) -> Device {
        Device::new(id, "Tank")
            .with_attribute(LEVEL_NODE, "level", "Number")
            .with_internal_attributes(internal_attributes)
    }
}

// =============================================================================
// Configuration Fixtures
// =============================================================================

/// Fixture providing agent configurations.
pub struct ConfigFixtures;

impl ConfigFixtures {
    /// A configured tank on `endpoint`.
    pub fn tank_config(id: &str, endpoint: &str) -> DeviceConfig {
        DeviceConfig {
            device_id: id.to_string(),
            entity_name: String::new(),
            entity_type: "Tank".to_string(),
            service: None,
            subservice: None,
            attributes: vec![
                AttributeConfig {
                    object_id: LEVEL_NODE.to_string(),
                    name: "level".to_string(),
                    attr_type: "Number".to_string(),
                },
                AttributeConfig {
                    object_id: TEMPERATURE_NODE.to_string(),
                    name: "temperature".to_string(),
                    attr_type: "Number".to_string(),
                },
            ],
            internal_attributes: AttributeFixtures::unsecured(endpoint),
        }
    }

    /// An agent configuration holding `devices`.
    pub fn agent(devices: Vec<DeviceConfig>) -> AgentConfig {
        let mut config = AgentConfig::default();
        config.devices = devices;
        config
    }

    /// A YAML configuration with one device and no connection parameters.
    pub fn yaml() -> &'static str {
        r#"
iota:
  log_level: INFO
  timestamp: true
  context_broker:
    host: orion
    port: 1026
  server:
    port: 4041
  service: factory
  subservice: /line1
  provider_url: ${PROVIDER_URL:http://iota-opcua:4041}

opcua:
  application_name: iota-opcua-test
  connection_strategy:
    initial_delay: 500ms
    max_retry: 3
    max_delay: 5s

logging:
  format: json

devices:
  - device_id: tank-1
    entity_type: Tank
    attributes:
      - object_id: "ns&eq3&sci&eq1001"
        name: level
        type: Number
"#
    }

    /// A YAML configuration with one signed device on [`E1`] and one
    /// unsecured device on [`E2`].
    pub fn yaml_with_connections() -> &'static str {
        r#"
iota:
  log_level: ERROR
  service: factory
  subservice: /line1

devices:
  - device_id: tank-1
    entity_type: Tank
    attributes:
      - object_id: "ns&eq3&sci&eq1001"
        name: level
        type: Number
    internal_attributes:
      opcuaEndpoint: opc.tcp://plc-1.factory:4840
      opcuaSecurityMode: Sign
      opcuaSecurityPolicy: Basic256Sha256
      opcuaCredentials:
        userName: operator
        password: secret
  - device_id: pump-1
    entity_type: Pump
    attributes:
      - object_id: "ns&eq3&scs&eqPump&lp1&rp.Speed"
        name: speed
        type: Number
    internal_attributes:
      - opcuaEndpoint: opc.tcp://plc-2.factory:4840
      - opcuaSecurityMode: None
        opcuaSecurityPolicy: None
"#
    }

    /// A JSON configuration with two devices on different endpoints.
    pub fn json() -> &'static str {
        r#"{
  "iota": { "log_level": "WARN", "service": "factory", "subservice": "/line1" },
  "devices": [
    {
      "device_id": "tank-1",
      "entity_type": "Tank",
      "attributes": [{ "object_id": "ns&eq3&sci&eq1001", "name": "level", "type": "Number" }],
      "internal_attributes": {
        "opcuaEndpoint": "opc.tcp://plc-1.factory:4840",
        "opcuaSecurityMode": "None",
        "opcuaSecurityPolicy": "None"
      }
    },
    {
      "device_id": "pump-1",
      "entity_type": "Pump",
      "service": "utilities",
      "attributes": [{ "object_id": "ns&eq3&scs&eqPump&lp1&rp.Speed", "name": "speed", "type": "Number" }],
      "internal_attributes": [
        { "opcuaEndpoint": "opc.tcp://plc-2.factory:4840" },
        { "opcuaSecurityMode": "None", "opcuaSecurityPolicy": "None" }
      ]
    }
  ]
}"#
    }
}
