// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA protocol error types.
//!
//! Establishment failures are split by the stage that failed so callers can
//! tell a refused endpoint from a rejected session or subscription. Every
//! category knows whether it is worth retrying and how loudly it should be
//! logged.
//!
//! # Error Categories
//!
//! ```text
//! OpcUaError
//! ├── Connection    - Transport connection to the endpoint
//! ├── Session       - Session creation, activation and close
//! ├── Subscription  - Subscription lifecycle
//! ├── Monitor       - Per-node monitored item registration
//! └── Configuration - Invalid descriptor or parameters
//! ```
//!
//! # Examples
//!
//! ```
//! use iota_opcua::error::{ConnectionError, OpcUaError};
//!
//! let error = OpcUaError::connection(ConnectionError::failed(
//!     "opc.tcp://localhost:4840",
//!     "connection refused",
//! ));
//! assert!(error.is_retryable());
//! assert_eq!(error.category(), "connection");
//! ```

use std::fmt;
use thiserror::Error;
use tracing::Level;

/// Result alias for OPC UA operations.
pub type OpcUaResult<T> = Result<T, OpcUaError>;

// =============================================================================
// OpcUaError - Main Error Type
// =============================================================================

/// The main error type for OPC UA operations.
#[derive(Debug, Error)]
pub enum OpcUaError {
    /// Transport connection errors.
    #[error("{0}")]
    Connection(#[from] ConnectionError),

    /// Session lifecycle errors.
    #[error("{0}")]
    Session(#[from] SessionError),

    /// Subscription lifecycle errors.
    #[error("{0}")]
    Subscription(#[from] SubscriptionError),

    /// Monitored item registration errors.
    #[error("{0}")]
    Monitor(#[from] MonitorError),

    /// Configuration errors.
    #[error("{0}")]
    Configuration(#[from] ConfigurationError),
}

impl OpcUaError {
    /// Creates a connection error.
    #[inline]
    pub fn connection(error: ConnectionError) -> Self {
        Self::Connection(error)
    }

    /// Creates a session error.
    #[inline]
    pub fn session(error: SessionError) -> Self {
        Self::Session(error)
    }

    /// Creates a subscription error.
    #[inline]
    pub fn subscription(error: SubscriptionError) -> Self {
        Self::Subscription(error)
    }

    /// Creates a monitor error.
    #[inline]
    pub fn monitor(error: MonitorError) -> Self {
        Self::Monitor(error)
    }

    /// Creates a configuration error.
    #[inline]
    pub fn configuration(error: ConfigurationError) -> Self {
        Self::Configuration(error)
    }

    /// Creates a not connected error.
    pub fn not_connected() -> Self {
        Self::Connection(ConnectionError::NotConnected)
    }

    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(e) => e.is_retryable(),
            Self::Session(e) => e.is_retryable(),
            Self::Subscription(e) => e.is_retryable(),
            Self::Monitor(_) => false,
            Self::Configuration(_) => false,
        }
    }

    /// Returns the severity level of this error.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Connection(e) => e.severity(),
            Self::Session(e) => e.severity(),
            Self::Subscription(_) => ErrorSeverity::Error,
            Self::Monitor(_) => ErrorSeverity::Warning,
            Self::Configuration(_) => ErrorSeverity::Critical,
        }
    }

    /// Returns the error category for logging.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::Session(_) => "session",
            Self::Subscription(_) => "subscription",
            Self::Monitor(_) => "monitor",
            Self::Configuration(_) => "configuration",
        }
    }

    /// Returns a unique error code for this error.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Connection(e) => e.error_code(),
            Self::Session(e) => e.error_code(),
            Self::Subscription(e) => e.error_code(),
            Self::Monitor(e) => e.error_code(),
            Self::Configuration(e) => e.error_code(),
        }
    }

    /// Returns the tracing level for this error.
    pub fn tracing_level(&self) -> Level {
        self.severity().to_tracing_level()
    }

    /// Logs this error with appropriate level and context.
    pub fn log(&self, context: &str) {
        let code = self.error_code();

        match self.tracing_level() {
            Level::ERROR => tracing::error!(
                error_code = %code,
                category = self.category(),
                context = context,
                retryable = self.is_retryable(),
                "{self}"
            ),
            Level::WARN => tracing::warn!(
                error_code = %code,
                category = self.category(),
                context = context,
                retryable = self.is_retryable(),
                "{self}"
            ),
            _ => tracing::debug!(
                error_code = %code,
                category = self.category(),
                context = context,
                retryable = self.is_retryable(),
                "{self}"
            ),
        }
    }
}

// =============================================================================
// ConnectionError
// =============================================================================

/// Transport connection errors.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Could not connect to the endpoint.
    #[error("Could not connect to OPC UA server {endpoint}. Error: {message}")]
    Failed {
        /// Endpoint URL.
        endpoint: String,
        /// Cause reported by the stack.
        message: String,
    },

    /// The endpoint URL is unusable.
    #[error("Invalid endpoint URL: '{url}' - {reason}")]
    InvalidEndpoint {
        /// The URL.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Reconnection attempts were exhausted.
    #[error("Reconnection to {endpoint} gave up after {attempts} attempts")]
    RetriesExhausted {
        /// Endpoint URL.
        endpoint: String,
        /// Number of attempts made.
        attempts: u32,
    },

    /// Failed to release the connection.
    #[error("Could not disconnect from OPC UA server {endpoint}. Error: {message}")]
    DisconnectFailed {
        /// Endpoint URL.
        endpoint: String,
        /// Cause reported by the stack.
        message: String,
    },

    /// An operation needed a connection that does not exist.
    #[error("Not connected to OPC UA server")]
    NotConnected,
}

impl ConnectionError {
    /// Creates a connection failure.
    pub fn failed(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid endpoint error.
    pub fn invalid_endpoint(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidEndpoint {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates a retries exhausted error.
    pub fn retries_exhausted(endpoint: impl Into<String>, attempts: u32) -> Self {
        Self::RetriesExhausted {
            endpoint: endpoint.into(),
            attempts,
        }
    }

    /// Creates a disconnect failure.
    pub fn disconnect_failed(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DisconnectFailed {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Failed { .. } | Self::RetriesExhausted { .. } | Self::NotConnected
        )
    }

    /// Returns the severity level.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::InvalidEndpoint { .. } => ErrorSeverity::Critical,
            Self::DisconnectFailed { .. } => ErrorSeverity::Warning,
            _ => ErrorSeverity::Error,
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Failed { .. } => ErrorCode::new(1, 1),
            Self::InvalidEndpoint { .. } => ErrorCode::new(1, 2),
            Self::RetriesExhausted { .. } => ErrorCode::new(1, 3),
            Self::DisconnectFailed { .. } => ErrorCode::new(1, 4),
            Self::NotConnected => ErrorCode::new(1, 5),
        }
    }
}

// =============================================================================
// SessionError
// =============================================================================

/// Session lifecycle errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Session creation or activation was rejected.
    #[error("Could not create a session in OPC UA server {endpoint}. Error: {message}")]
    CreationFailed {
        /// Endpoint URL.
        endpoint: String,
        /// Cause reported by the stack.
        message: String,
    },

    /// The server rejected the supplied identity.
    #[error("Authentication failed for user '{user_name}' on {endpoint}")]
    AuthenticationFailed {
        /// Endpoint URL.
        endpoint: String,
        /// User name presented.
        user_name: String,
    },

    /// Closing the session failed.
    #[error("Could not close the session in OPC UA server {endpoint}. Error: {message}")]
    CloseFailed {
        /// Endpoint URL.
        endpoint: String,
        /// Cause reported by the stack.
        message: String,
    },

    /// An operation needed a session that does not exist.
    #[error("No active session")]
    NotEstablished,
}

impl SessionError {
    /// Creates a session creation failure.
    pub fn creation_failed(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CreationFailed {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Creates an authentication failure.
    pub fn authentication_failed(endpoint: impl Into<String>, user_name: impl Into<String>) -> Self {
        Self::AuthenticationFailed {
            endpoint: endpoint.into(),
            user_name: user_name.into(),
        }
    }

    /// Creates a session close failure.
    pub fn close_failed(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CloseFailed {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::CreationFailed { .. } | Self::NotEstablished)
    }

    /// Returns the severity level.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::AuthenticationFailed { .. } => ErrorSeverity::Critical,
            Self::CloseFailed { .. } => ErrorSeverity::Warning,
            _ => ErrorSeverity::Error,
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::CreationFailed { .. } => ErrorCode::new(2, 1),
            Self::AuthenticationFailed { .. } => ErrorCode::new(2, 2),
            Self::CloseFailed { .. } => ErrorCode::new(2, 3),
            Self::NotEstablished => ErrorCode::new(2, 4),
        }
    }
}

// =============================================================================
// SubscriptionError
// =============================================================================

/// Subscription lifecycle errors.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    /// The server refused to create the subscription.
    #[error("Could not create a subscription in OPC UA server {endpoint}. Error: {message}")]
    CreationFailed {
        /// Endpoint URL.
        endpoint: String,
        /// Cause reported by the stack.
        message: String,
    },

    /// Deleting the subscription failed.
    #[error("Could not terminate subscription {subscription_id}. Error: {message}")]
    TerminateFailed {
        /// Server-assigned subscription id.
        subscription_id: u32,
        /// Cause reported by the stack.
        message: String,
    },

    /// An operation needed a subscription that does not exist.
    #[error("No active subscription")]
    NotEstablished,
}

impl SubscriptionError {
    /// Creates a subscription creation failure.
    pub fn creation_failed(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CreationFailed {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Creates a subscription termination failure.
    pub fn terminate_failed(subscription_id: u32, message: impl Into<String>) -> Self {
        Self::TerminateFailed {
            subscription_id,
            message: message.into(),
        }
    }

    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::CreationFailed { .. })
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::CreationFailed { .. } => ErrorCode::new(3, 1),
            Self::TerminateFailed { .. } => ErrorCode::new(3, 2),
            Self::NotEstablished => ErrorCode::new(3, 3),
        }
    }
}

// =============================================================================
// MonitorError
// =============================================================================

/// Monitored item registration errors.
///
/// These are reported per node and never abort a device as a whole.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// The server rejected the monitored item.
    #[error("Could not monitor node '{node_id}'. Error: {message}")]
    RegistrationFailed {
        /// Node identifier.
        node_id: String,
        /// Cause reported by the stack.
        message: String,
    },

    /// The node identifier could not be parsed.
    #[error("Invalid node ID '{node_id}': {reason}")]
    InvalidNodeId {
        /// Node identifier.
        node_id: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Terminating the monitored item failed.
    #[error("An error has ocurred terminating monitoring of {node_id}. Error: {message}")]
    TerminateFailed {
        /// Node identifier.
        node_id: String,
        /// Cause reported by the stack.
        message: String,
    },

    /// The client is not ready to register monitors.
    #[error("Client for {endpoint} is not ready to monitor (state: {state})")]
    NotReady {
        /// Endpoint URL.
        endpoint: String,
        /// Current client state.
        state: String,
    },
}

impl MonitorError {
    /// Creates a registration failure.
    pub fn registration_failed(node_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RegistrationFailed {
            node_id: node_id.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid node id error.
    pub fn invalid_node_id(node_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidNodeId {
            node_id: node_id.into(),
            reason: reason.into(),
        }
    }

    /// Creates a termination failure.
    pub fn terminate_failed(node_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TerminateFailed {
            node_id: node_id.into(),
            message: message.into(),
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::RegistrationFailed { .. } => ErrorCode::new(4, 1),
            Self::InvalidNodeId { .. } => ErrorCode::new(4, 2),
            Self::TerminateFailed { .. } => ErrorCode::new(4, 3),
            Self::NotReady { .. } => ErrorCode::new(4, 4),
        }
    }
}

// =============================================================================
// ConfigurationError
// =============================================================================

/// Invalid client configuration.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// Unknown security mode.
    #[error("Invalid OPC UA Security Mode '{mode}'. Possible values: {possible}")]
    InvalidSecurityMode {
        /// The rejected value.
        mode: String,
        /// Accepted values.
        possible: String,
    },

    /// Unknown security policy.
    #[error("Invalid OPC UA Security Policy '{policy}'. Possible values: {possible}")]
    InvalidSecurityPolicy {
        /// The rejected value.
        policy: String,
        /// Accepted values.
        possible: String,
    },

    /// A signing security mode was requested without credentials.
    #[error("Security Mode {mode} requires credentials")]
    MissingCredentials {
        /// The security mode.
        mode: String,
    },

    /// A parameter is outside its valid range.
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue {
        /// Field name.
        field: String,
        /// Error message.
        message: String,
    },
}

impl ConfigurationError {
    /// Creates an invalid value error.
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::InvalidSecurityMode { .. } => ErrorCode::new(5, 1),
            Self::InvalidSecurityPolicy { .. } => ErrorCode::new(5, 2),
            Self::MissingCredentials { .. } => ErrorCode::new(5, 3),
            Self::InvalidValue { .. } => ErrorCode::new(5, 4),
        }
    }
}

// =============================================================================
// ErrorSeverity
// =============================================================================

/// Error severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Informational - no action required.
    Info,
    /// Warning - action may be required.
    Warning,
    /// Error - action required, but recoverable.
    Error,
    /// Critical - immediate action required.
    Critical,
}

impl ErrorSeverity {
    /// Converts to tracing level.
    pub fn to_tracing_level(self) -> Level {
        match self {
            Self::Info => Level::INFO,
            Self::Warning => Level::WARN,
            Self::Error | Self::Critical => Level::ERROR,
        }
    }

    /// Returns the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// ErrorCode
// =============================================================================

/// Structured error code, formatted as `UA-XXYY`.
///
/// Categories: 1 connection, 2 session, 3 subscription, 4 monitor,
/// 5 configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode {
    /// Category.
    pub category: u8,
    /// Specific error within category.
    pub code: u8,
}

impl ErrorCode {
    /// Creates a new error code.
    pub const fn new(category: u8, code: u8) -> Self {
        Self { category, code }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UA-{:02X}{:02X}", self.category, self.code)
    }
}

// =============================================================================
// Tests
// =============================================================================
