// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA client layer for the IoT agent.
//!
//! Provides the per-endpoint [`ProtocolClient`], the transport seam it runs
//! on, and the value types shared with the rest of the agent.
//!
//! # Features
//!
//! - Connect, session and subscription lifecycle with guaranteed cleanup
//! - Independent value monitors, several per node if needed
//! - Security modes: None, Sign, SignAndEncrypt
//! - Simulated transport for development; the `real-transport` feature adds
//!   a transport backed by the `opcua` crate
//!
//! # Error Handling
//!
//! ```text
//! OpcUaError
//! ├── Connection    - Endpoint unreachable, disconnect failures
//! ├── Session       - Session creation, authentication, close
//! ├── Subscription  - Subscription creation and termination
//! ├── Monitor       - Node id parsing, item registration and termination
//! └── Configuration - Invalid security or client settings
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod client;
pub mod error;
pub mod types;

pub use error::{
    ConfigurationError, ConnectionError, ErrorCode, ErrorSeverity, MonitorError, OpcUaError,
    OpcUaResult, SessionError, SubscriptionError,
};

pub use types::{
    ClientSettings, ConnectionDescriptor, ConnectionStrategy, Credentials, MonitoringParameters,
    NodeId, NodeIdentifier, SecurityMode, SecurityPolicy, SubscriptionParameters,
};

pub use client::{
    ChannelCallback, ClientState, ClientStats, ConnectionEvent, DataChangeNotification,
    MonitorCallback, MonitorEvent, MonitorKey, OpcUaTransport, OpcUaValue, ProtocolClient,
    SimulatedTransport, SimulatedTransportFactory, TransportFactory, TransportState,
};

#[cfg(feature = "real-transport")]
pub use client::{RealOpcUaTransport, RealTransportFactory};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
