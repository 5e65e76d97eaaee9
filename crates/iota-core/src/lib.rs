// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # iota-core
//!
//! Orchestration core of the OPC UA IoT agent.
//!
//! - **Resolver**: provisioning internal attributes to a `ConnectionDescriptor`
//! - **Escape**: node identifier escape tokens
//! - **Pool**: one started protocol client per endpoint
//! - **Binding**: device attributes to monitors, value changes to the update sink
//! - **Agent**: start and stop ordering against the framework
//! - **Framework**: the IoT agent framework boundary and a standalone implementation
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use iota_core::{Agent, ClientPool, DeviceBindingManager, StandaloneFramework};
//! use iota_opcua::SimulatedTransportFactory;
//!
//! let framework = Arc::new(StandaloneFramework::new());
//! let pool = Arc::new(ClientPool::new(Arc::new(SimulatedTransportFactory::new()), config.opcua.clone()));
//! let bindings = Arc::new(DeviceBindingManager::new(pool.clone(), framework.clone()));
//! let agent = Agent::new(framework.clone(), pool, bindings);
//!
//! agent.start(&config).await?;
//! // ...
//! agent.stop().await;
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod agent;
pub mod binding;
pub mod device;
pub mod error;
pub mod escape;
pub mod framework;
pub mod pool;
pub mod resolver;
pub mod standalone;

pub use agent::{Agent, AgentState};
pub use binding::{AttributeForwarder, BoundAttribute, DeviceBinding, DeviceBindingManager};
pub use device::{ActiveAttribute, AttributeValue, Device};
pub use error::{AgentError, AgentResult, ValidationErrors};
pub use escape::replace_forbidden_characters;
pub use framework::{
    AgentFramework, DeviceHandler, DeviceRegistry, TimestampMiddleware, UpdateMiddleware,
    UpdateSink, TIMESTAMP_ATTRIBUTE,
};
pub use pool::ClientPool;
pub use resolver::resolve;
pub use standalone::StandaloneFramework;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
