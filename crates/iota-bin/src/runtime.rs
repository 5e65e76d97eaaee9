// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Agent runtime orchestration.
//!
//! Wires the framework, the client pool, the binding manager and the agent
//! together, starts the agent and keeps it running until shutdown.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use iota_config::{AgentConfig, ConfigLoader};
use iota_core::{Agent, ClientPool, DeviceBindingManager, StandaloneFramework};
use iota_opcua::{SimulatedTransportFactory, TransportFactory};
use tracing::{info, warn};

use crate::error::{BinError, BinResult};
use crate::shutdown::ShutdownCoordinator;

// =============================================================================
// AgentRuntime
// =============================================================================

/// Runs one agent from start to shutdown.
#[derive(Debug)]
pub struct AgentRuntime {
    config: Arc<AgentConfig>,
    shutdown: ShutdownCoordinator,
    simulate: bool,
}

impl AgentRuntime {
    /// Creates a runtime for `config`.
    pub fn new(config: AgentConfig) -> Self {
        Self {
            config: Arc::new(config),
            shutdown: ShutdownCoordinator::new(),
            simulate: false,
        }
    }

    /// Uses the in-process simulated transport instead of real sessions.
    pub fn with_simulate(mut self, simulate: bool) -> Self {
        self.simulate = simulate;
        self
    }

    /// Returns the loaded configuration.
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Returns a handle that can end [`run`](Self::run).
    pub fn shutdown_handle(&self) -> ShutdownCoordinator {
        self.shutdown.clone()
    }

    /// Starts the agent and runs until shutdown is signaled.
    ///
    /// # Errors
    ///
    /// A startup error if the agent fails to start. Failures while
    /// stopping are logged, not returned.
    pub async fn run(self) -> BinResult<()> {
        info!(
            version = iota_core::VERSION,
            devices = self.config.devices.len(),
            "Starting OPC UA IoT Agent"
        );

        let agent = self.build_agent();
        agent
            .start(&self.config)
            .await
            .map_err(|e| BinError::startup(e.to_string()))?;

        info!(
            north_port = self.config.iota.server.port,
            context_broker = %format!(
                "{}:{}",
                self.config.iota.context_broker.host, self.config.iota.context_broker.port
            ),
            endpoints = ?agent.pool().endpoints(),
            "OPC UA IoT Agent is ready"
        );

        self.shutdown.wait_for_shutdown().await;

        info!("Shutdown initiated, cleaning up...");
        agent.stop().await;
        info!("OPC UA IoT Agent shutdown complete");

        Ok(())
    }

    /// Builds the component graph. The binding manager forwards into the
    /// same framework the agent drives.
    fn build_agent(&self) -> Agent {
        let framework = Arc::new(StandaloneFramework::new());
        let pool = Arc::new(ClientPool::new(
            self.transport_factory(),
            self.config.opcua.clone(),
        ));
        let bindings = Arc::new(DeviceBindingManager::new(pool.clone(), framework.clone()));

        Agent::new(framework, pool, bindings)
    }

    fn transport_factory(&self) -> Arc<dyn TransportFactory> {
        if self.simulate {
            info!("Using simulated OPC UA transport");
            return Arc::new(SimulatedTransportFactory::new());
        }

        #[cfg(feature = "real-transport")]
        {
            Arc::new(iota_opcua::RealTransportFactory::new(
                self.config.opcua.application_name.clone(),
            ))
        }

        #[cfg(not(feature = "real-transport"))]
        {
            warn!("Built without the real-transport feature, using simulated OPC UA transport");
            Arc::new(SimulatedTransportFactory::new())
        }
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for [`AgentRuntime`].
#[derive(Default)]
pub struct RuntimeBuilder {
    config_path: Option<PathBuf>,
    config: Option<AgentConfig>,
    simulate: bool,
}

impl RuntimeBuilder {
    /// Creates a new runtime builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the configuration file path.
    pub fn config_path(mut self, path: impl AsRef<Path>) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets the configuration directly.
    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Selects the simulated transport.
    pub fn simulate(mut self, simulate: bool) -> Self {
        self.simulate = simulate;
        self
    }

    /// Builds the runtime, loading the configuration file unless a
    /// configuration was given directly.
    pub fn build(self) -> BinResult<AgentRuntime> {
        let config = match self.config {
            Some(config) => config,
            None => {
                let path = self
                    .config_path
                    .ok_or_else(|| BinError::config("No configuration provided"))?;
                ConfigLoader::new()
                    .load(&path)
                    .map_err(|e| BinError::from(e).with_context(format!("loading {}", path.display())))?
            }
        };

        if config.devices.is_empty() {
            warn!("No devices configured; waiting for provisioning requests");
        }

        Ok(AgentRuntime::new(config).with_simulate(self.simulate))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use iota_config::{AttributeConfig, DeviceConfig};
    use std::io::Write;
    use std::time::Duration;

    fn device(id: &str, endpoint: &str) -> DeviceConfig {
        DeviceConfig {
            device_id: id.to_string(),
            entity_name: String::new(),
            entity_type: "Boiler".to_string(),
            service: None,
            subservice: None,
            attributes: vec![AttributeConfig {
                object_id: "ns&eq2&sci&eq7".to_string(),
                name: "temperature".to_string(),
                attr_type: "Number".to_string(),
            }],
            internal_attributes: serde_json::json!({
                "opcuaEndpoint": endpoint,
                "opcuaSecurityMode": "None",
                "opcuaSecurityPolicy": "None"
            }),
        }
    }

    #[test]
    fn test_runtime_builder() {
        let runtime = RuntimeBuilder::new()
            .config(AgentConfig::default())
            .simulate(true)
            .build()
            .unwrap();

        assert!(runtime.simulate);
        assert!(runtime.config().devices.is_empty());
    }

    #[test]
    fn test_runtime_builder_requires_config() {
        let err = RuntimeBuilder::new().build().unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_runtime_builder_loads_file() {
        let mut file = tempfile::NamedTempFile::with_suffix(".json").unwrap();
        write!(
            file,
            r#"{{"iota": {{"log_level": "INFO"}}, "devices": [{{
                "device_id": "boiler-1",
                "entity_type": "Boiler",
                "internal_attributes": {{"opcuaEndpoint": "opc.tcp://boiler:4840"}}
            }}]}}"#
        )
        .unwrap();

        let runtime = RuntimeBuilder::new().config_path(file.path()).build().unwrap();
        assert_eq!(runtime.config().devices.len(), 1);
        assert_eq!(runtime.config().devices[0].device_id, "boiler-1");
    }

    #[test]
    fn test_runtime_builder_missing_file() {
        let err = RuntimeBuilder::new()
            .config_path("/nonexistent/agent.yaml")
            .build()
            .unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("/nonexistent/agent.yaml"));
    }

    #[tokio::test]
    async fn test_run_until_shutdown() {
        let mut config = AgentConfig::default();
        config.devices.push(device("boiler-1", "opc.tcp://boiler:4840"));

        let runtime = RuntimeBuilder::new().config(config).simulate(true).build().unwrap();
        let shutdown = runtime.shutdown_handle();

        let handle = tokio::spawn(runtime.run());
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.initiate_shutdown();

        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("runtime should stop")
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_run_fails_on_unreachable_device() {
        let mut config = AgentConfig::default();
        config.devices.push(device("boiler-1", "http://boiler:4840"));

        let runtime = RuntimeBuilder::new().config(config).simulate(true).build().unwrap();
        let err = runtime.run().await.unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }
}
