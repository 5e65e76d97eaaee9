// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Runtime device model.
//!
//! A [`Device`] is what the framework hands to the provisioning and removal
//! handlers: the entity it maps to, its active attributes and the raw
//! internal attributes carrying the OPC UA connection parameters.

use iota_config::{AttributeConfig, DeviceConfig, IotaConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Default attribute type.
pub const DEFAULT_ATTRIBUTE_TYPE: &str = "string";

// =============================================================================
// Device
// =============================================================================

/// A provisioned device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    /// Device identifier.
    pub id: String,

    /// Entity name on the context broker.
    pub name: String,

    /// Entity type on the context broker.
    #[serde(rename = "type")]
    pub entity_type: String,

    /// Tenant service.
    pub service: String,

    /// Tenant subservice.
    pub subservice: String,

    /// Active attributes.
    #[serde(default)]
    pub active: Vec<ActiveAttribute>,

    /// Provisioning internal attributes.
    #[serde(default)]
    pub internal_attributes: JsonValue,
}

impl Device {
    /// Creates a device whose entity is `{entity_type}:{id}`.
    pub fn new(id: impl Into<String>, entity_type: impl Into<String>) -> Self {
        let id = id.into();
        let entity_type = entity_type.into();
        Self {
            name: format!("{}:{}", entity_type, id),
            id,
            entity_type,
            service: String::new(),
            subservice: String::new(),
            active: Vec::new(),
            internal_attributes: JsonValue::Null,
        }
    }

    /// Builds a device from its configuration entry, filling the blanks from
    /// the framework defaults.
    pub fn from_config(config: &DeviceConfig, defaults: &IotaConfig) -> Self {
        let entity_type = if config.entity_type.is_empty() {
            defaults.default_type.clone()
        } else {
            config.entity_type.clone()
        };

        let name = if config.entity_name.is_empty() {
            format!("{}:{}", entity_type, config.device_id)
        } else {
            config.entity_name.clone()
        };

        Self {
            id: config.device_id.clone(),
            name,
            entity_type,
            service: config
                .service
                .clone()
                .unwrap_or_else(|| defaults.service.clone()),
            subservice: config
                .subservice
                .clone()
                .unwrap_or_else(|| defaults.subservice.clone()),
            active: config.attributes.iter().map(ActiveAttribute::from).collect(),
            internal_attributes: config.internal_attributes.clone(),
        }
    }

    /// Sets the entity name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the tenant.
    pub fn with_tenant(mut self, service: impl Into<String>, subservice: impl Into<String>) -> Self {
        self.service = service.into();
        self.subservice = subservice.into();
        self
    }

    /// Adds an active attribute.
    pub fn with_attribute(
        mut self,
        object_id: impl Into<String>,
        name: impl Into<String>,
        attr_type: impl Into<String>,
    ) -> Self {
        self.active.push(ActiveAttribute {
            object_id: object_id.into(),
            name: name.into(),
            attr_type: attr_type.into(),
        });
        self
    }

    /// Sets the internal attributes.
    pub fn with_internal_attributes(mut self, internal_attributes: JsonValue) -> Self {
        self.internal_attributes = internal_attributes;
        self
    }
}

// =============================================================================
// ActiveAttribute
// =============================================================================

/// An attribute whose value is pushed by the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveAttribute {
    /// Escaped OPC UA node identifier.
    pub object_id: String,

    /// Attribute name on the entity.
    pub name: String,

    /// Attribute type on the entity.
    #[serde(rename = "type")]
    pub attr_type: String,
}

impl From<&AttributeConfig> for ActiveAttribute {
    fn from(config: &AttributeConfig) -> Self {
        Self {
            object_id: config.object_id.clone(),
            name: config.name.clone(),
            attr_type: if config.attr_type.is_empty() {
                DEFAULT_ATTRIBUTE_TYPE.to_string()
            } else {
                config.attr_type.clone()
            },
        }
    }
}

// =============================================================================
// AttributeValue
// =============================================================================

/// One attribute update sent to the context broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeValue {
    /// Attribute name.
    pub name: String,

    /// Attribute type.
    #[serde(rename = "type")]
    pub attr_type: String,

    /// Stringified value.
    pub value: String,
}

impl AttributeValue {
    /// Creates an attribute value.
    pub fn new(
        name: impl Into<String>,
        attr_type: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            attr_type: attr_type.into(),
            value: value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_config_fills_defaults() {
        let config = DeviceConfig {
            device_id: "plc-1".to_string(),
            entity_name: String::new(),
            entity_type: String::new(),
            service: None,
            subservice: Some("/line1".to_string()),
            attributes: vec![AttributeConfig {
                object_id: "ns&eq3&sci&eq1001".to_string(),
                name: "level".to_string(),
                attr_type: "Number".to_string(),
            }],
            internal_attributes: json!({"opcuaEndpoint": "opc.tcp://plc-1:4840"}),
        };

        let device = Device::from_config(&config, &IotaConfig::default());
        assert_eq!(device.entity_type, "Thing");
        assert_eq!(device.name, "Thing:plc-1");
        assert_eq!(device.service, "howtoService");
        assert_eq!(device.subservice, "/line1");
        assert_eq!(device.active[0].attr_type, "Number");
        assert_eq!(device.internal_attributes["opcuaEndpoint"], "opc.tcp://plc-1:4840");
    }

    #[test]
    fn test_builder() {
        let device = Device::new("pump-7", "Pump")
            .with_attribute("ns&eq2&scs&eqSpeed", "speed", "Number")
            .with_tenant("plant", "/north");

        assert_eq!(device.name, "Pump:pump-7");
        assert_eq!(device.active.len(), 1);
        assert_eq!(device.subservice, "/north");
    }
}
