// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA client.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       ProtocolClient                            │
//! │   (connect → session → subscription, monitors, orderly stop)    │
//! └─────────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       OpcUaTransport                            │
//! │   SimulatedTransport  |  RealOpcUaTransport (real-transport)    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Transports are created through a [`TransportFactory`], which lets the
//! client pool stay ignorant of the concrete protocol stack.

mod callback;
mod protocol_client;
mod simulated;
mod state;
mod transport;

#[cfg(feature = "real-transport")]
mod real_transport;

pub use callback::{ChannelCallback, MonitorCallback, MonitorEvent};
pub use protocol_client::{MonitorKey, ProtocolClient};
pub use simulated::{SimulatedTransport, SimulatedTransportFactory};
pub use state::{ClientState, ClientStats};
pub use transport::{
    ConnectionEvent, DataChangeNotification, OpcUaTransport, OpcUaValue, TransportFactory,
    TransportState,
};

#[cfg(feature = "real-transport")]
pub use real_transport::{RealOpcUaTransport, RealTransportFactory};
