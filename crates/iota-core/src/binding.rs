// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Device bindings.
//!
//! The [`DeviceBindingManager`] is the provisioning and removal handler. It
//! resolves a device's connection parameters, obtains the pooled client for
//! the endpoint and registers one monitor per active attribute. Each value
//! change is forwarded to the update sink as a single attribute update.
//!
//! A binding owns only its own monitors. Removing a device terminates those
//! and leaves the shared client running for the other devices on the same
//! endpoint.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use iota_opcua::{
    ConnectionError, DataChangeNotification, MonitorCallback, MonitorKey, OpcUaError, ProtocolClient,
};
use tokio::sync::Mutex;

use crate::device::{AttributeValue, Device};
use crate::error::AgentResult;
use crate::escape::replace_forbidden_characters;
use crate::framework::{DeviceHandler, DeviceRegistry, UpdateSink};
use crate::pool::ClientPool;
use crate::resolver;

// =============================================================================
// DeviceBinding
// =============================================================================

/// The monitors registered for one device.
#[derive(Clone)]
pub struct DeviceBinding {
    /// Device identifier.
    pub device_id: String,
    /// Endpoint of the shared client.
    pub endpoint: String,
    /// One entry per active attribute.
    pub attributes: Vec<BoundAttribute>,
    client: Arc<ProtocolClient>,
}

impl DeviceBinding {
    /// Returns the shared client.
    pub fn client(&self) -> &Arc<ProtocolClient> {
        &self.client
    }

    /// Returns the unescaped node ids, in attribute order.
    pub fn node_ids(&self) -> Vec<&str> {
        self.attributes.iter().map(|a| a.node_id.as_str()).collect()
    }

    /// Returns the number of attributes with a live monitor.
    pub fn monitored_count(&self) -> usize {
        self.attributes.iter().filter(|a| a.key.is_some()).count()
    }
}

impl std::fmt::Debug for DeviceBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceBinding")
            .field("device_id", &self.device_id)
            .field("endpoint", &self.endpoint)
            .field("attributes", &self.attributes)
            .finish()
    }
}

/// One attribute of a binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundAttribute {
    /// Unescaped node identifier.
    pub node_id: String,
    /// Attribute name.
    pub name: String,
    /// Attribute type.
    pub attr_type: String,
    /// Monitor registration; `None` when the server refused the node.
    pub key: Option<MonitorKey>,
}

// =============================================================================
// AttributeForwarder
// =============================================================================

/// Forwards the value changes of one attribute to the update sink.
pub struct AttributeForwarder {
    device: Arc<Device>,
    name: String,
    attr_type: String,
    sink: Arc<dyn UpdateSink>,
}

impl AttributeForwarder {
    /// Creates a forwarder for the attribute `name` of `device`.
    pub fn new(
        device: Arc<Device>,
        name: impl Into<String>,
        attr_type: impl Into<String>,
        sink: Arc<dyn UpdateSink>,
    ) -> Self {
        Self {
            device,
            name: name.into(),
            attr_type: attr_type.into(),
            sink,
        }
    }
}

#[async_trait]
impl MonitorCallback for AttributeForwarder {
    async fn on_data_change(&self, node_id: &str, notification: DataChangeNotification) {
        let value = AttributeValue::new(&self.name, &self.attr_type, notification.value.to_string());

        tracing::debug!(
            device_id = %self.device.id,
            node_id,
            attribute = %self.name,
            value = %value.value,
            "Value changed"
        );

        let result = self
            .sink
            .update(&self.device.name, &self.device.entity_type, vec![value], &self.device)
            .await;

        if let Err(e) = result {
            tracing::warn!(
                device_id = %self.device.id,
                entity = %self.device.name,
                attribute = %self.name,
                error = %e,
                "Failed to forward value"
            );
        }
    }

    async fn on_error(&self, node_id: &str, error: OpcUaError) {
        tracing::warn!(
            device_id = %self.device.id,
            node_id,
            attribute = %self.name,
            error = %error,
            "Monitor registration failed"
        );
    }
}

// =============================================================================
// DeviceBindingManager
// =============================================================================

/// Maps provisioned devices onto monitors of pooled clients.
pub struct DeviceBindingManager {
    pool: Arc<ClientPool>,
    sink: Arc<dyn UpdateSink>,
    bindings: DashMap<String, DeviceBinding>,
    /// Serializes provisioning and removal per device id.
    device_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl DeviceBindingManager {
    /// Creates a manager over `pool`, forwarding changes into `sink`.
    pub fn new(pool: Arc<ClientPool>, sink: Arc<dyn UpdateSink>) -> Self {
        Self {
            pool,
            sink,
            bindings: DashMap::new(),
            device_locks: DashMap::new(),
        }
    }

    /// Returns the client pool.
    pub fn pool(&self) -> &Arc<ClientPool> {
        &self.pool
    }

    /// Returns the binding of `device_id`.
    pub fn binding(&self, device_id: &str) -> Option<DeviceBinding> {
        self.bindings.get(device_id).map(|entry| entry.value().clone())
    }

    /// Returns the number of bound devices.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Returns `true` if no device is bound.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Forgets every binding without touching the clients.
    pub fn clear(&self) {
        self.bindings.clear();
    }

    fn device_lock(&self, device_id: &str) -> Arc<Mutex<()>> {
        Arc::clone(self.device_locks.entry(device_id.to_string()).or_default().value())
    }

    /// Binds `device`: resolve, get the pooled client, monitor every active
    /// attribute.
    ///
    /// Nodes the server refuses are logged and do not fail the device.
    /// Provisioning a bound device again replaces its binding. Calls for
    /// the same device id run one at a time.
    ///
    /// # Errors
    ///
    /// `Validation` for bad connection parameters (nothing is created),
    /// `Protocol` if the client cannot be started or the pool is closed.
    pub async fn provision(&self, device: &Device) -> AgentResult<()> {
        let descriptor = resolver::resolve(Some(&device.internal_attributes)).map_err(|errors| {
            tracing::error!(device_id = %device.id, errors = %errors, "Invalid connection parameters");
            errors
        })?;

        let lock = self.device_lock(&device.id);
        let _guard = lock.lock().await;

        let client = self.pool.get_or_create(&descriptor).await?;

        if let Some((_, previous)) = self.bindings.remove(&device.id) {
            tracing::debug!(device_id = %device.id, "Replacing existing binding");
            release(&previous).await;
        }

        let shared = Arc::new(device.clone());
        let mut attributes = Vec::with_capacity(device.active.len());

        for attribute in &device.active {
            let node_id = replace_forbidden_characters(&attribute.object_id);
            let forwarder = AttributeForwarder::new(
                Arc::clone(&shared),
                &attribute.name,
                &attribute.attr_type,
                Arc::clone(&self.sink),
            );

            let key = client.monitor(&node_id, Arc::new(forwarder)).await;
            attributes.push(BoundAttribute {
                node_id,
                name: attribute.name.clone(),
                attr_type: attribute.attr_type.clone(),
                key,
            });
        }

        let binding = DeviceBinding {
            device_id: device.id.clone(),
            endpoint: descriptor.endpoint.clone(),
            attributes,
            client,
        };

        // The pool was closed while monitors were being registered.
        if self.pool.is_closed() {
            release(&binding).await;
            let error = ConnectionError::failed(&binding.endpoint, "client pool is closed");
            return Err(OpcUaError::connection(error).into());
        }

        tracing::info!(
            device_id = %device.id,
            endpoint = %binding.endpoint,
            attributes = binding.attributes.len(),
            monitored = binding.monitored_count(),
            "Device bound"
        );

        if let Some(displaced) = self.bindings.insert(device.id.clone(), binding) {
            release(&displaced).await;
        }
        Ok(())
    }

    /// Unbinds `device`, terminating only its own monitors.
    ///
    /// A device without a binding owns no monitors, so nothing is touched.
    pub async fn remove(&self, device: &Device) -> AgentResult<()> {
        let lock = self.device_lock(&device.id);
        let _guard = lock.lock().await;

        match self.bindings.remove(&device.id) {
            Some((_, binding)) => {
                release(&binding).await;
                tracing::info!(device_id = %device.id, endpoint = %binding.endpoint, "Device unbound");
            }
            None => tracing::debug!(device_id = %device.id, "Removed device had no binding"),
        }
        Ok(())
    }

    /// Replays provisioning for every device in `registry`, one at a time,
    /// stopping at the first failure.
    pub async fn reload_all<R>(&self, registry: &R) -> AgentResult<()>
    where
        R: DeviceRegistry + ?Sized,
    {
        let devices = registry.list_devices().await?;
        tracing::info!(devices = devices.len(), "Reloading provisioned devices");

        for device in &devices {
            self.provision(device).await.map_err(|e| {
                tracing::error!(device_id = %device.id, error = %e, "Device reload failed");
                e
            })?;
        }

        Ok(())
    }
}

async fn release(binding: &DeviceBinding) {
    for attribute in &binding.attributes {
        if let Some(key) = attribute.key {
            binding.client.unmonitor_key(key).await;
        }
    }
}

#[async_trait]
impl DeviceHandler for DeviceBindingManager {
    async fn on_provision(&self, device: &Device) -> AgentResult<()> {
        self.provision(device).await
    }

    async fn on_remove(&self, device: &Device) -> AgentResult<()> {
        self.remove(device).await
    }
}

impl std::fmt::Debug for DeviceBindingManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceBindingManager")
            .field("devices", &self.bindings.len())
            .field("pool", &self.pool)
            .finish()
    }
}
