// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Agent lifecycle.
//!
//! # State Machine
//!
//! ```text
//! Stopped ──start──▶ Activating ──▶ Running ──stop──▶ Stopping ──▶ Stopped
//!                        │
//!                        └── failure: unwind ──▶ Stopped
//! ```
//!
//! `start` activates the framework, installs the handlers and middlewares,
//! then reloads the registered devices. `stop` stops the pooled clients
//! before touching the framework, so no late value change reaches a
//! deactivated update sink. The pool stays closed from then until the next
//! `start`, so a provisioning request still in flight cannot open a new
//! connection.

use std::fmt;
use std::sync::Arc;

use iota_config::AgentConfig;
use parking_lot::RwLock;
use tokio::sync::Mutex;

use crate::binding::DeviceBindingManager;
use crate::error::{AgentError, AgentResult};
use crate::framework::{AgentFramework, TimestampMiddleware};
use crate::pool::ClientPool;

/// Agent lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AgentState {
    /// Not running.
    #[default]
    Stopped,
    /// `start` in progress.
    Activating,
    /// Accepting provisioning and forwarding values.
    Running,
    /// `stop` in progress.
    Stopping,
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentState::Stopped => write!(f, "Stopped"),
            AgentState::Activating => write!(f, "Activating"),
            AgentState::Running => write!(f, "Running"),
            AgentState::Stopping => write!(f, "Stopping"),
        }
    }
}

/// Orchestrates the framework, the pool and the bindings.
pub struct Agent {
    framework: Arc<dyn AgentFramework>,
    pool: Arc<ClientPool>,
    bindings: Arc<DeviceBindingManager>,
    state: RwLock<AgentState>,
    lifecycle: Mutex<()>,
}

impl Agent {
    /// Creates a stopped agent.
    ///
    /// `bindings` must forward into `framework` and draw clients from
    /// `pool`.
    pub fn new(
        framework: Arc<dyn AgentFramework>,
        pool: Arc<ClientPool>,
        bindings: Arc<DeviceBindingManager>,
    ) -> Self {
        Self {
            framework,
            pool,
            bindings,
            state: RwLock::new(AgentState::Stopped),
            lifecycle: Mutex::new(()),
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> AgentState {
        *self.state.read()
    }

    /// Returns the client pool.
    pub fn pool(&self) -> &Arc<ClientPool> {
        &self.pool
    }

    /// Returns the binding manager.
    pub fn bindings(&self) -> &Arc<DeviceBindingManager> {
        &self.bindings
    }

    /// Returns the framework.
    pub fn framework(&self) -> &Arc<dyn AgentFramework> {
        &self.framework
    }

    fn set_state(&self, state: AgentState) {
        let previous = std::mem::replace(&mut *self.state.write(), state);
        tracing::debug!(from = %previous, to = %state, "Agent state changed");
    }

    /// Starts the agent.
    ///
    /// On failure everything done so far is undone and the agent is back to
    /// [`AgentState::Stopped`].
    ///
    /// # Errors
    ///
    /// `InvalidState` unless stopped; otherwise the activation or reload
    /// failure.
    pub async fn start(&self, config: &AgentConfig) -> AgentResult<()> {
        let _guard = self.lifecycle.lock().await;

        let state = self.state();
        if state != AgentState::Stopped {
            return Err(AgentError::invalid_state(AgentState::Stopped, state));
        }

        self.set_state(AgentState::Activating);
        self.pool.reopen();

        match self.activate(config).await {
            Ok(()) => {
                self.set_state(AgentState::Running);
                tracing::info!(
                    devices = self.bindings.len(),
                    clients = self.pool.len(),
                    "OPC UA IoT Agent started"
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "OPC UA IoT Agent failed to start");
                self.unwind().await;
                self.set_state(AgentState::Stopped);
                Err(e)
            }
        }
    }

    async fn activate(&self, config: &AgentConfig) -> AgentResult<()> {
        self.framework.activate(config).await?;
        tracing::info!("IoT Agent lib has been activated");

        let handler = Arc::clone(&self.bindings);
        self.framework.set_provisioning_handler(handler.clone());
        self.framework.set_remove_device_handler(handler);

        if config.iota.timestamp {
            self.framework
                .add_update_middleware(Arc::new(TimestampMiddleware::new()));
        }

        self.bindings.reload_all(self.framework.as_ref()).await
    }

    /// Stops the agent.
    ///
    /// Order: stop every pooled client, reset the middlewares, deactivate
    /// the framework. Failures are logged and the remaining steps still run.
    /// Stopping a stopped agent does nothing.
    pub async fn stop(&self) {
        let _guard = self.lifecycle.lock().await;

        if self.state() == AgentState::Stopped {
            return;
        }

        tracing::info!("Stopping the OPC UA IoT Agent");
        self.set_state(AgentState::Stopping);
        self.unwind().await;
        self.set_state(AgentState::Stopped);
        tracing::info!("OPC UA IoT Agent has been stopped");
    }

    async fn unwind(&self) {
        self.pool.remove_all().await;
        self.bindings.clear();

        if let Err(e) = self.framework.reset_middlewares().await {
            tracing::warn!(error = %e, "Failed to reset middlewares");
        }
        if let Err(e) = self.framework.deactivate().await {
            tracing::warn!(error = %e, "Failed to deactivate framework");
        }
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("state", &self.state())
            .field("pool", &self.pool)
            .field("bindings", &self.bindings)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::standalone::StandaloneFramework;
    use iota_config::{AttributeConfig, DeviceConfig};
    use iota_opcua::{ClientSettings, SimulatedTransportFactory};
    use serde_json::json;

    fn build() -> (Arc<StandaloneFramework>, Agent) {
        let framework = Arc::new(StandaloneFramework::new());
        let pool = Arc::new(ClientPool::new(
            Arc::new(SimulatedTransportFactory::new()),
            ClientSettings::default(),
        ));
        let bindings = Arc::new(DeviceBindingManager::new(pool.clone(), framework.clone()));
        let agent = Agent::new(framework.clone(), pool, bindings);
        (framework, agent)
    }

    fn device_config(id: &str, endpoint: &str) -> DeviceConfig {
        DeviceConfig {
            device_id: id.to_string(),
            entity_name: String::new(),
            entity_type: "Tank".to_string(),
            service: None,
            subservice: None,
            attributes: vec![AttributeConfig {
                object_id: "ns&eq3&sci&eq1001".to_string(),
                name: "level".to_string(),
                attr_type: "Number".to_string(),
            }],
            internal_attributes: json!({
                "opcuaEndpoint": endpoint,
                "opcuaSecurityMode": "None",
                "opcuaSecurityPolicy": "None"
            }),
        }
    }

    #[tokio::test]
    async fn test_start_reloads_configured_devices() {
        let (framework, agent) = build();
        let mut config = AgentConfig::default();
        config.devices.push(device_config("plc-1", "opc.tcp://plc-1:4840"));
        config.devices.push(device_config("plc-2", "opc.tcp://plc-1:4840"));

        agent.start(&config).await.unwrap();
        assert_eq!(agent.state(), AgentState::Running);
        assert_eq!(agent.pool().len(), 1);
        assert_eq!(agent.bindings().len(), 2);
        assert!(framework.has_handlers());
        assert_eq!(framework.middleware_count(), 1);

        agent.stop().await;
        assert_eq!(agent.state(), AgentState::Stopped);
        assert!(agent.pool().is_empty());
        assert!(!framework.is_active());
        assert_eq!(framework.middleware_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_reload_unwinds() {
        let (framework, agent) = build();
        let mut config = AgentConfig::default();
        config.devices.push(device_config("plc-1", "opc.tcp://plc-1:4840"));
        config.devices.push(device_config("broken", "http://plc-2:4840"));
        config.devices.push(device_config("plc-3", "opc.tcp://plc-3:4840"));

        assert!(agent.start(&config).await.is_err());
        assert_eq!(agent.state(), AgentState::Stopped);
        assert!(agent.pool().is_empty());
        assert!(!framework.is_active());
        assert_eq!(framework.middleware_count(), 0);
    }

    #[tokio::test]
    async fn test_timestamp_middleware_optional() {
        let (framework, agent) = build();
        let mut config = AgentConfig::default();
        config.iota.timestamp = false;

        agent.start(&config).await.unwrap();
        assert_eq!(framework.middleware_count(), 0);
        agent.stop().await;
    }

    #[tokio::test]
    async fn test_double_start_rejected() {
        let (_, agent) = build();
        let config = AgentConfig::default();

        agent.start(&config).await.unwrap();
        let error = agent.start(&config).await.unwrap_err();
        assert!(matches!(error, AgentError::InvalidState { .. }));

        agent.stop().await;
        agent.stop().await;
        assert_eq!(agent.state(), AgentState::Stopped);
    }
}
