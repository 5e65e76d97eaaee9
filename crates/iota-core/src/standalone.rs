// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! In-process framework.
//!
//! [`StandaloneFramework`] stands in for the IoT agent framework when the
//! agent runs on its own: a memory device registry seeded from the
//! configured devices, handler dispatch for provisioning and removal, and an
//! update sink that runs the middlewares and records the last values per
//! entity instead of talking to a context broker.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use iota_config::AgentConfig;
use parking_lot::RwLock;

use crate::device::{AttributeValue, Device};
use crate::error::{AgentError, AgentResult};
use crate::framework::{AgentFramework, DeviceHandler, DeviceRegistry, UpdateMiddleware, UpdateSink};

/// In-process implementation of [`AgentFramework`].
#[derive(Default)]
pub struct StandaloneFramework {
    active: AtomicBool,
    /// Registered devices in provisioning order.
    registry: RwLock<Vec<Device>>,
    provisioning_handler: RwLock<Option<Arc<dyn DeviceHandler>>>,
    remove_handler: RwLock<Option<Arc<dyn DeviceHandler>>>,
    middlewares: RwLock<Vec<Arc<dyn UpdateMiddleware>>>,
    last_values: RwLock<HashMap<String, Vec<AttributeValue>>>,
    updates: AtomicU64,
}

impl StandaloneFramework {
    /// Creates an inactive framework with an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a framework whose registry already holds `devices`.
    pub fn with_devices(devices: impl IntoIterator<Item = Device>) -> Self {
        let framework = Self::new();
        for device in devices {
            framework.register(device);
        }
        framework
    }

    /// Returns `true` between `activate` and `deactivate`.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Provisions `device` through the installed handler and registers it
    /// on success.
    ///
    /// # Errors
    ///
    /// `Framework` if the framework is inactive or no handler is installed,
    /// otherwise whatever the handler rejects the device with.
    pub async fn provision(&self, device: Device) -> AgentResult<()> {
        self.ensure_active()?;
        let handler = self
            .provisioning_handler
            .read()
            .clone()
            .ok_or_else(|| AgentError::framework("no provisioning handler installed"))?;

        handler.on_provision(&device).await?;

        tracing::info!(device_id = %device.id, entity = %device.name, "Device provisioned");
        self.register(device);
        Ok(())
    }

    /// Removes the device `device_id` through the installed handler and
    /// deregisters it. Unknown ids are a no-op.
    pub async fn remove(&self, device_id: &str) -> AgentResult<()> {
        self.ensure_active()?;
        let Some(device) = self.device(device_id) else {
            return Ok(());
        };

        let handler = self.remove_handler.read().clone();
        if let Some(handler) = handler {
            handler.on_remove(&device).await?;
        }

        self.registry.write().retain(|d| d.id != device_id);
        tracing::info!(device_id, "Device removed");
        Ok(())
    }

    /// Returns a registered device.
    pub fn device(&self, device_id: &str) -> Option<Device> {
        self.registry.read().iter().find(|d| d.id == device_id).cloned()
    }

    /// Returns the number of registered devices.
    pub fn device_count(&self) -> usize {
        self.registry.read().len()
    }

    /// Returns the values of the last update for `entity`.
    pub fn last_values(&self, entity: &str) -> Option<Vec<AttributeValue>> {
        self.last_values.read().get(entity).cloned()
    }

    /// Returns the number of accepted updates.
    pub fn update_count(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }

    /// Returns the number of installed middlewares.
    pub fn middleware_count(&self) -> usize {
        self.middlewares.read().len()
    }

    /// Returns `true` if both handlers are installed.
    pub fn has_handlers(&self) -> bool {
        self.provisioning_handler.read().is_some() && self.remove_handler.read().is_some()
    }

    fn register(&self, device: Device) {
        let mut registry = self.registry.write();
        match registry.iter_mut().find(|d| d.id == device.id) {
            Some(existing) => *existing = device,
            None => registry.push(device),
        }
    }

    fn ensure_active(&self) -> AgentResult<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(AgentError::framework("framework is not active"))
        }
    }
}

#[async_trait]
impl UpdateSink for StandaloneFramework {
    async fn update(
        &self,
        device_name: &str,
        device_type: &str,
        values: Vec<AttributeValue>,
        device: &Device,
    ) -> AgentResult<()> {
        if !self.is_active() {
            return Err(AgentError::forwarding(device_name, "framework is not active"));
        }

        let middlewares = self.middlewares.read().clone();
        let mut values = values;
        for middleware in &middlewares {
            values = middleware.apply(device, values)?;
        }

        tracing::debug!(
            entity = device_name,
            entity_type = device_type,
            attributes = ?values.iter().map(|v| format!("{}={}", v.name, v.value)).collect::<Vec<_>>(),
            "Entity updated"
        );

        self.last_values.write().insert(device_name.to_string(), values);
        self.updates.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[async_trait]
impl DeviceRegistry for StandaloneFramework {
    async fn list_devices(&self) -> AgentResult<Vec<Device>> {
        Ok(self.registry.read().clone())
    }
}

#[async_trait]
impl AgentFramework for StandaloneFramework {
    async fn activate(&self, config: &AgentConfig) -> AgentResult<()> {
        if self.active.swap(true, Ordering::AcqRel) {
            return Err(AgentError::framework("framework is already active"));
        }

        for device_config in &config.devices {
            if self.device(&device_config.device_id).is_none() {
                self.register(Device::from_config(device_config, &config.iota));
            }
        }

        tracing::info!(
            service = %config.iota.service,
            subservice = %config.iota.subservice,
            registry = ?config.iota.device_registry.registry_type,
            devices = self.device_count(),
            "IoT Agent framework has been activated"
        );
        Ok(())
    }

    async fn deactivate(&self) -> AgentResult<()> {
        if !self.active.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        *self.provisioning_handler.write() = None;
        *self.remove_handler.write() = None;
        tracing::info!("IoT Agent framework has been deactivated");
        Ok(())
    }

    async fn reset_middlewares(&self) -> AgentResult<()> {
        self.middlewares.write().clear();
        Ok(())
    }

    fn set_provisioning_handler(&self, handler: Arc<dyn DeviceHandler>) {
        *self.provisioning_handler.write() = Some(handler);
    }

    fn set_remove_device_handler(&self, handler: Arc<dyn DeviceHandler>) {
        *self.remove_handler.write() = Some(handler);
    }

    fn add_update_middleware(&self, middleware: Arc<dyn UpdateMiddleware>) {
        tracing::debug!(middleware = middleware.name(), "Update middleware added");
        self.middlewares.write().push(middleware);
    }
}

impl std::fmt::Debug for StandaloneFramework {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StandaloneFramework")
            .field("active", &self.is_active())
            .field("devices", &self.device_count())
            .field("middlewares", &self.middleware_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::TimestampMiddleware;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        provisioned: Mutex<Vec<String>>,
        removed: Mutex<Vec<String>>,
        reject: bool,
    }

    #[async_trait]
    impl DeviceHandler for Recorder {
        async fn on_provision(&self, device: &Device) -> AgentResult<()> {
            if self.reject {
                return Err(AgentError::framework("rejected"));
            }
            self.provisioned.lock().push(device.id.clone());
            Ok(())
        }

        async fn on_remove(&self, device: &Device) -> AgentResult<()> {
            self.removed.lock().push(device.id.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_provision_and_remove_dispatch() {
        let framework = StandaloneFramework::new();
        framework.activate(&AgentConfig::default()).await.unwrap();

        let recorder = Arc::new(Recorder::default());
        framework.set_provisioning_handler(recorder.clone());
        framework.set_remove_device_handler(recorder.clone());

        framework.provision(Device::new("plc-1", "Tank")).await.unwrap();
        assert_eq!(framework.device_count(), 1);

        framework.remove("plc-1").await.unwrap();
        assert_eq!(framework.device_count(), 0);
        assert_eq!(*recorder.provisioned.lock(), vec!["plc-1"]);
        assert_eq!(*recorder.removed.lock(), vec!["plc-1"]);
    }

    #[tokio::test]
    async fn test_rejected_device_not_registered() {
        let framework = StandaloneFramework::new();
        framework.activate(&AgentConfig::default()).await.unwrap();
        framework.set_provisioning_handler(Arc::new(Recorder {
            reject: true,
            ..Default::default()
        }));

        assert!(framework.provision(Device::new("plc-1", "Tank")).await.is_err());
        assert_eq!(framework.device_count(), 0);
    }

    #[tokio::test]
    async fn test_update_runs_middlewares() {
        let framework = StandaloneFramework::new();
        framework.activate(&AgentConfig::default()).await.unwrap();
        framework.add_update_middleware(Arc::new(TimestampMiddleware::new()));

        let device = Device::new("plc-1", "Tank");
        framework
            .update(
                &device.name,
                &device.entity_type,
                vec![AttributeValue::new("level", "Number", "3")],
                &device,
            )
            .await
            .unwrap();

        let values = framework.last_values("Tank:plc-1").unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(framework.update_count(), 1);

        framework.reset_middlewares().await.unwrap();
        assert_eq!(framework.middleware_count(), 0);
    }

    #[tokio::test]
    async fn test_inactive_framework_refuses_updates() {
        let framework = StandaloneFramework::new();
        let device = Device::new("plc-1", "Tank");

        let result = framework
            .update(&device.name, &device.entity_type, Vec::new(), &device)
            .await;
        assert!(matches!(result, Err(AgentError::Forwarding { .. })));
        assert!(framework.provision(device).await.is_err());
    }

    #[tokio::test]
    async fn test_deactivate_is_idempotent_and_clears_handlers() {
        let framework = StandaloneFramework::new();
        framework.activate(&AgentConfig::default()).await.unwrap();
        let recorder = Arc::new(Recorder::default());
        framework.set_provisioning_handler(recorder.clone());
        framework.set_remove_device_handler(recorder);
        assert!(framework.has_handlers());

        framework.deactivate().await.unwrap();
        framework.deactivate().await.unwrap();
        assert!(!framework.is_active());
        assert!(!framework.has_handlers());
    }
}
