// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Test Harness
//!
//! Wires the agent components around a [`MockTransportFactory`] so each
//! test gets an isolated pool, binding manager and framework.

use std::sync::Arc;
use std::time::Duration;

use iota_config::AgentConfig;
use iota_core::{Agent, AgentResult, ClientPool, Device, DeviceBindingManager, StandaloneFramework};
use iota_opcua::ClientSettings;

use super::mocks::{MockServer, MockTransportFactory, RecordingSink};

/// Default timeout for waiting on forwarded values.
pub const DELIVERY_TIMEOUT: Duration = Duration::from_secs(2);

/// Client settings with short intervals.
pub fn fast_settings() -> ClientSettings {
    let mut settings = ClientSettings::default();
    settings.subscription.publishing_interval = Duration::from_millis(10);
    settings.monitoring.sampling_interval = Duration::from_millis(10);
    settings
}

// =============================================================================
// Binding Harness
// =============================================================================

/// Pool and binding manager forwarding into a [`RecordingSink`].
pub struct BindingHarness {
    /// Mock server behind every transport.
    pub server: Arc<MockServer>,
    /// The pool under test.
    pub pool: Arc<ClientPool>,
    /// Sink receiving forwarded values.
    pub sink: Arc<RecordingSink>,
    /// The binding manager under test.
    pub bindings: Arc<DeviceBindingManager>,
}

impl BindingHarness {
    /// Creates a harness with a fresh mock server.
    pub fn new() -> Self {
        let factory = MockTransportFactory::new();
        let server = factory.server();
        let pool = Arc::new(ClientPool::new(Arc::new(factory), fast_settings()));
        let sink = Arc::new(RecordingSink::new());
        let bindings = Arc::new(DeviceBindingManager::new(pool.clone(), sink.clone()));

        Self {
            server,
            pool,
            sink,
            bindings,
        }
    }
}

impl Default for BindingHarness {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Agent Harness
// =============================================================================

/// A complete agent over the standalone framework and the mock transport.
pub struct AgentHarness {
    /// Mock server behind every transport.
    pub server: Arc<MockServer>,
    /// The in-process framework.
    pub framework: Arc<StandaloneFramework>,
    /// The agent under test.
    pub agent: Agent,
}

impl AgentHarness {
    /// Creates a stopped agent with a fresh mock server.
    pub fn new() -> Self {
        let factory = MockTransportFactory::new();
        let server = factory.server();
        let framework = Arc::new(StandaloneFramework::new());
        let pool = Arc::new(ClientPool::new(Arc::new(factory), fast_settings()));
        let bindings = Arc::new(DeviceBindingManager::new(pool.clone(), framework.clone()));
        let agent = Agent::new(framework.clone(), pool, bindings);

        Self {
            server,
            framework,
            agent,
        }
    }

    /// Starts the agent with `config`.
    pub async fn start(&self, config: &AgentConfig) -> AgentResult<()> {
        self.agent.start(config).await
    }

    /// Starts the agent with an empty configuration.
    pub async fn start_empty(&self) -> AgentResult<()> {
        self.agent.start(&AgentConfig::default()).await
    }

    /// Provisions `device` through the framework, as a northbound request would.
    pub async fn provision(&self, device: Device) -> AgentResult<()> {
        self.framework.provision(device).await
    }

    /// Removes `device_id` through the framework.
    pub async fn remove(&self, device_id: &str) -> AgentResult<()> {
        self.framework.remove(device_id).await
    }

    /// Number of pooled clients.
    pub fn pool_size(&self) -> usize {
        self.agent.pool().len()
    }
}

impl Default for AgentHarness {
    fn default() -> Self {
        Self::new()
    }
}
