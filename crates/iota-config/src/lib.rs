// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # iota-config
//!
//! Configuration management for the OPC UA IoT agent.
//!
//! ## Features
//!
//! - **Schema Definition**: framework, OPC UA client, device and logging sections
//! - **Multi-Format Support**: YAML, TOML, and JSON configuration files
//! - **Environment Overrides**: `IOTA_*` variables override file values
//! - **Placeholders**: `${VAR}` and `${VAR:default}` in the raw file
//!
//! ## Quick Start
//!
//! ```no_run
//! use iota_config::loader::load_config;
//!
//! let config = load_config("agent.yaml").unwrap();
//!
//! println!("Context broker: {}", config.iota.context_broker.host);
//! println!("Devices: {}", config.devices.len());
//! ```
//!
//! ## Configuration Schema
//!
//! - `iota` - framework settings (log level, context broker, registry, timestamps)
//! - `opcua` - connection strategy, subscription and monitoring parameters
//! - `devices` - statically provisioned devices
//! - `logging` - output format
//!
//! Values in config files can reference environment variables:
//!
//! ```yaml
//! iota:
//!   context_broker:
//!     host: "${CB_HOST:localhost}"
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod loader;
pub mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load_config, ConfigFormat, ConfigLoader};
pub use schema::{
    AgentConfig, AttributeConfig, ContextBrokerConfig, DeviceConfig, DeviceRegistryConfig,
    IotaConfig, LogFormat, LogLevel, LoggingConfig, RegistryType, ServerConfig,
    DEFAULT_CONTEXT_BROKER_PORT, DEFAULT_NORTH_PORT,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
