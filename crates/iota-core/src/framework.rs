// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Boundary to the IoT agent framework.
//!
//! The framework owns the northbound API, the device registry and the
//! context broker client. The core only needs the surface below:
//!
//! - lifecycle: [`AgentFramework::activate`], [`AgentFramework::deactivate`],
//!   [`AgentFramework::reset_middlewares`]
//! - handler registration for provisioning and removal
//! - update middlewares
//! - the update sink ([`UpdateSink`]) and the registry listing
//!   ([`DeviceRegistry`])

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use iota_config::AgentConfig;

use crate::device::{AttributeValue, Device};
use crate::error::AgentResult;

/// Attribute appended by [`TimestampMiddleware`].
pub const TIMESTAMP_ATTRIBUTE: &str = "TimeInstant";

/// Type of the timestamp attribute.
pub const TIMESTAMP_TYPE: &str = "DateTime";

// =============================================================================
// Traits
// =============================================================================

/// Receives attribute updates for an entity.
#[async_trait]
pub trait UpdateSink: Send + Sync {
    /// Updates `values` on the entity `(device_name, device_type)`.
    async fn update(
        &self,
        device_name: &str,
        device_type: &str,
        values: Vec<AttributeValue>,
        device: &Device,
    ) -> AgentResult<()>;
}

/// Lists provisioned devices.
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    /// Returns every registered device.
    async fn list_devices(&self) -> AgentResult<Vec<Device>>;
}

/// Reacts to device provisioning and removal.
#[async_trait]
pub trait DeviceHandler: Send + Sync {
    /// Called when a device is provisioned. An error rejects the device.
    async fn on_provision(&self, device: &Device) -> AgentResult<()>;

    /// Called when a device is removed.
    async fn on_remove(&self, device: &Device) -> AgentResult<()>;
}

/// Transforms values before they reach the context broker.
pub trait UpdateMiddleware: Send + Sync {
    /// Returns the middleware name for logging.
    fn name(&self) -> &'static str;

    /// Returns the transformed values.
    fn apply(&self, device: &Device, values: Vec<AttributeValue>) -> AgentResult<Vec<AttributeValue>>;
}

/// The external IoT agent framework.
#[async_trait]
pub trait AgentFramework: UpdateSink + DeviceRegistry {
    /// Activates the framework with `config`.
    async fn activate(&self, config: &AgentConfig) -> AgentResult<()>;

    /// Deactivates the framework. Idempotent.
    async fn deactivate(&self) -> AgentResult<()>;

    /// Removes every installed update middleware.
    async fn reset_middlewares(&self) -> AgentResult<()>;

    /// Installs the provisioning handler.
    fn set_provisioning_handler(&self, handler: Arc<dyn DeviceHandler>);

    /// Installs the removal handler.
    fn set_remove_device_handler(&self, handler: Arc<dyn DeviceHandler>);

    /// Appends an update middleware.
    fn add_update_middleware(&self, middleware: Arc<dyn UpdateMiddleware>);
}

// =============================================================================
// TimestampMiddleware
// =============================================================================

/// Appends a `TimeInstant` attribute with the current time.
#[derive(Debug, Default, Clone, Copy)]
pub struct TimestampMiddleware;

impl TimestampMiddleware {
    /// Creates the middleware.
    pub fn new() -> Self {
        Self
    }
}

impl UpdateMiddleware for TimestampMiddleware {
    fn name(&self) -> &'static str {
        "timestamp"
    }

    fn apply(&self, _device: &Device, mut values: Vec<AttributeValue>) -> AgentResult<Vec<AttributeValue>> {
        if values.iter().any(|v| v.name == TIMESTAMP_ATTRIBUTE) {
            return Ok(values);
        }

        values.push(AttributeValue::new(
            TIMESTAMP_ATTRIBUTE,
            TIMESTAMP_TYPE,
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        ));
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    #[test]
    fn test_timestamp_appended_once() {
        let device = Device::new("plc-1", "Tank");
        let values = vec![AttributeValue::new("level", "Number", "4.2")];

        let values = TimestampMiddleware::new().apply(&device, values).unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values[1].name, TIMESTAMP_ATTRIBUTE);
        assert_eq!(values[1].attr_type, TIMESTAMP_TYPE);
        assert!(DateTime::parse_from_rfc3339(&values[1].value).is_ok());

        let values = TimestampMiddleware::new().apply(&device, values).unwrap();
        assert_eq!(values.len(), 2);
    }
}
