// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA transport abstraction layer.
//!
//! The transport is the seam to the protocol stack. It exposes the raw
//! lifecycle steps (connect, session, subscription, monitored items) and
//! nothing else; sequencing, ownership and cleanup belong to
//! [`ProtocolClient`](super::ProtocolClient).

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};

use crate::error::OpcUaResult;
use crate::types::{
    ConnectionDescriptor, ConnectionStrategy, Credentials, MonitoringParameters, NodeId,
    SubscriptionParameters,
};

// =============================================================================
// TransportState
// =============================================================================

/// Connection state of the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransportState {
    /// Transport is not connected.
    #[default]
    Disconnected,

    /// Transport is establishing connection.
    Connecting,

    /// Transport is connected and ready.
    Connected,

    /// Transport is reconnecting after a failure.
    Reconnecting,

    /// Transport connection has failed.
    Failed,
}

impl TransportState {
    /// Returns `true` if the transport is connected.
    #[inline]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Returns `true` if the transport is in a transitional state.
    #[inline]
    pub fn is_transitioning(&self) -> bool {
        matches!(self, Self::Connecting | Self::Reconnecting)
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Reconnecting => write!(f, "Reconnecting"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

// =============================================================================
// OpcUaValue
// =============================================================================

/// A value reported by a monitored item.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum OpcUaValue {
    /// Boolean value.
    Boolean(bool),
    /// Signed byte.
    SByte(i8),
    /// Unsigned byte.
    Byte(u8),
    /// 16-bit signed integer.
    Int16(i16),
    /// 16-bit unsigned integer.
    UInt16(u16),
    /// 32-bit signed integer.
    Int32(i32),
    /// 32-bit unsigned integer.
    UInt32(u32),
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit unsigned integer.
    UInt64(u64),
    /// 32-bit float.
    Float(f32),
    /// 64-bit double.
    Double(f64),
    /// String value.
    String(String),
    /// Date/time value.
    DateTime(DateTime<Utc>),
    /// GUID value.
    Guid(uuid::Uuid),
    /// Byte string.
    ByteString(Vec<u8>),
    /// Array of values.
    Array(Vec<OpcUaValue>),
    /// Null value.
    #[default]
    Null,
}

impl OpcUaValue {
    /// Returns `true` if this is a null value.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Attempts to get the value as an f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::SByte(v) => Some(*v as f64),
            Self::Byte(v) => Some(*v as f64),
            Self::Int16(v) => Some(*v as f64),
            Self::UInt16(v) => Some(*v as f64),
            Self::Int32(v) => Some(*v as f64),
            Self::UInt32(v) => Some(*v as f64),
            Self::Int64(v) => Some(*v as f64),
            Self::UInt64(v) => Some(*v as f64),
            Self::Float(v) => Some(*v as f64),
            Self::Double(v) => Some(*v),
            _ => None,
        }
    }
}

/// The stringified form forwarded as an attribute value.
impl fmt::Display for OpcUaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(v) => write!(f, "{}", v),
            Self::SByte(v) => write!(f, "{}", v),
            Self::Byte(v) => write!(f, "{}", v),
            Self::Int16(v) => write!(f, "{}", v),
            Self::UInt16(v) => write!(f, "{}", v),
            Self::Int32(v) => write!(f, "{}", v),
            Self::UInt32(v) => write!(f, "{}", v),
            Self::Int64(v) => write!(f, "{}", v),
            Self::UInt64(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Double(v) => write!(f, "{}", v),
            Self::String(v) => write!(f, "{}", v),
            Self::DateTime(v) => write!(f, "{}", v.to_rfc3339()),
            Self::Guid(v) => write!(f, "{}", v),
            Self::ByteString(v) => {
                for byte in v {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
            Self::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
            Self::Null => write!(f, "null"),
        }
    }
}

// =============================================================================
// DataChangeNotification
// =============================================================================

/// One value change reported for a monitored item.
#[derive(Debug, Clone, PartialEq)]
pub struct DataChangeNotification {
    /// Node that changed.
    pub node_id: NodeId,

    /// New value.
    pub value: OpcUaValue,

    /// OPC UA status code (0 = Good).
    pub status_code: u32,

    /// Timestamp from the data source.
    pub source_timestamp: Option<DateTime<Utc>>,

    /// Timestamp from the server.
    pub server_timestamp: Option<DateTime<Utc>>,
}

impl DataChangeNotification {
    /// Creates a good-quality notification stamped now.
    pub fn new(node_id: NodeId, value: OpcUaValue) -> Self {
        let now = Utc::now();
        Self {
            node_id,
            value,
            status_code: 0,
            source_timestamp: Some(now),
            server_timestamp: Some(now),
        }
    }

    /// Returns `true` if the status is good.
    #[inline]
    pub fn is_good(&self) -> bool {
        self.status_code & 0xC000_0000 == 0
    }
}

// =============================================================================
// ConnectionEvent
// =============================================================================

/// Reconnection lifecycle signals raised by the stack.
///
/// These are observability data only; they never restart a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The connection was lost and the stack is reconnecting.
    Reconnecting,

    /// A reconnection attempt is scheduled.
    Backoff {
        /// Attempt number (1-based).
        attempt: u32,
        /// Delay before the attempt.
        delay: Duration,
    },

    /// The connection was re-established.
    Reestablished,

    /// The connection was closed.
    Closed,
}

impl fmt::Display for ConnectionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reconnecting => write!(f, "starting reconnection"),
            Self::Backoff { attempt, delay } => {
                write!(f, "backoff attempt #{}. Retrying in {:?}", attempt, delay)
            }
            Self::Reestablished => write!(f, "connection reestablished"),
            Self::Closed => write!(f, "connection closed"),
        }
    }
}

// =============================================================================
// OpcUaTransport Trait
// =============================================================================

/// Abstract transport trait for OPC UA communication.
///
/// Methods that change the connection or session take `&mut self`;
/// subscription and monitored item calls take `&self` so monitors can be
/// registered concurrently.
#[async_trait]
pub trait OpcUaTransport: Send + Sync {
    /// Opens the transport connection to the endpoint.
    async fn connect(&mut self) -> OpcUaResult<()>;

    /// Closes the transport connection.
    async fn disconnect(&mut self) -> OpcUaResult<()>;

    /// Creates and activates a session. Anonymous when `credentials` is
    /// `None`.
    async fn create_session(&mut self, credentials: Option<&Credentials>) -> OpcUaResult<()>;

    /// Closes the session.
    async fn close_session(&mut self) -> OpcUaResult<()>;

    /// Creates a subscription and returns its server id.
    async fn create_subscription(&self, params: &SubscriptionParameters) -> OpcUaResult<u32>;

    /// Deletes a subscription together with its monitored items.
    async fn delete_subscription(&self, subscription_id: u32) -> OpcUaResult<()>;

    /// Creates a monitored item on the value attribute of `node_id`.
    ///
    /// Every change is pushed into `sender` in server order. The transport
    /// stops sending once the item is deleted or the receiver is dropped.
    async fn create_monitored_item(
        &self,
        subscription_id: u32,
        node_id: &NodeId,
        params: &MonitoringParameters,
        sender: mpsc::Sender<DataChangeNotification>,
    ) -> OpcUaResult<u32>;

    /// Deletes one monitored item.
    async fn delete_monitored_item(&self, subscription_id: u32, item_id: u32) -> OpcUaResult<()>;

    /// Installs the channel for reconnection events.
    fn set_event_sink(&mut self, _events: broadcast::Sender<ConnectionEvent>) {}

    /// Returns the current transport state.
    fn state(&self) -> TransportState;

    /// Returns the endpoint URL.
    fn endpoint(&self) -> &str;
}

// =============================================================================
// TransportFactory
// =============================================================================

/// Creates transports for the client pool.
pub trait TransportFactory: Send + Sync {
    /// Returns the factory name for logging.
    fn name(&self) -> &'static str;

    /// Creates an unconnected transport for `descriptor`.
    fn create(
        &self,
        descriptor: &ConnectionDescriptor,
        strategy: &ConnectionStrategy,
    ) -> OpcUaResult<Box<dyn OpcUaTransport>>;
}

// =============================================================================
// Tests
// =============================================================================
