// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Error hierarchy for the agent core.
//!
//! # Error Hierarchy
//!
//! ```text
//! AgentError (root)
//! ├── Validation    - connection parameters rejected by the resolver
//! ├── Protocol      - OPC UA establishment failures (OpcUaError)
//! ├── Framework     - the external IoT agent framework refused a call
//! ├── Forwarding    - the update sink rejected a value
//! └── InvalidState  - lifecycle call in the wrong state
//! ```
//!
//! None of these is process-fatal. Validation and protocol errors are
//! reported to the provisioning caller, forwarding errors are logged.
//!
//! # Examples
//!
//! ```
//! use iota_core::error::{AgentError, ValidationErrors};
//!
//! let errors = ValidationErrors::from(vec![
//!     "opcuaEndpoint was expected but it was not provided!".to_string(),
//! ]);
//! let error: AgentError = errors.into();
//! assert_eq!(error.error_type(), "validation");
//! ```

use std::fmt;

use iota_opcua::OpcUaError;
use thiserror::Error;

// =============================================================================
// AgentError
// =============================================================================

/// The root error type for the agent core.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Connection parameters failed validation.
    #[error("{0}")]
    Validation(#[from] ValidationErrors),

    /// Protocol client error.
    #[error("OPC UA error: {0}")]
    Protocol(#[from] OpcUaError),

    /// Framework call failed.
    #[error("Framework error: {message}")]
    Framework {
        /// Error message.
        message: String,
    },

    /// Update sink call failed.
    #[error("Failed to forward update for '{entity}': {message}")]
    Forwarding {
        /// Entity the update was meant for.
        entity: String,
        /// Error message.
        message: String,
    },

    /// Lifecycle operation not allowed in the current state.
    #[error("Invalid state: expected {expected}, was {actual}")]
    InvalidState {
        /// Expected state.
        expected: String,
        /// Actual state.
        actual: String,
    },
}

impl AgentError {
    /// Creates a framework error.
    pub fn framework(message: impl Into<String>) -> Self {
        Self::Framework {
            message: message.into(),
        }
    }

    /// Creates a forwarding error.
    pub fn forwarding(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Forwarding {
            entity: entity.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid state error.
    pub fn invalid_state(expected: impl fmt::Display, actual: impl fmt::Display) -> Self {
        Self::InvalidState {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Returns `true` if retrying the same request later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            AgentError::Protocol(e) => e.is_retryable(),
            AgentError::Forwarding { .. } => true,
            _ => false,
        }
    }

    /// Returns the error type as a string for logging.
    pub fn error_type(&self) -> &'static str {
        match self {
            AgentError::Validation(_) => "validation",
            AgentError::Protocol(_) => "protocol",
            AgentError::Framework { .. } => "framework",
            AgentError::Forwarding { .. } => "forwarding",
            AgentError::InvalidState { .. } => "invalid_state",
        }
    }
}

/// A Result type with AgentError.
pub type AgentResult<T> = Result<T, AgentError>;

// =============================================================================
// ValidationErrors
// =============================================================================

/// Ordered list of connection parameter problems.
///
/// Every problem found in one provisioning attempt is collected so the
/// operator sees all of them at once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Error)]
#[error("{}", .0.join(", "))]
pub struct ValidationErrors(Vec<String>);

impl ValidationErrors {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message.
    pub fn push(&mut self, message: impl Into<String>) {
        self.0.push(message.into());
    }

    /// Returns `true` if no problem was recorded.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of messages.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns the messages in the order they were found.
    pub fn messages(&self) -> &[String] {
        &self.0
    }

    /// Returns `true` if any message contains `needle`.
    pub fn mentions(&self, needle: &str) -> bool {
        self.0.iter().any(|m| m.contains(needle))
    }
}

impl From<Vec<String>> for ValidationErrors {
    fn from(messages: Vec<String>) -> Self {
        Self(messages)
    }
}

impl IntoIterator for ValidationErrors {
    type Item = String;
    type IntoIter = std::vec::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use iota_opcua::ConnectionError;

    #[test]
    fn test_validation_errors_display_joins_messages() {
        let mut errors = ValidationErrors::new();
        errors.push("opcuaEndpoint was expected but it was not provided!");
        errors.push("opcuaSecurityPolicy was expected but it was not provided!");

        assert_eq!(errors.len(), 2);
        assert_eq!(
            errors.to_string(),
            "opcuaEndpoint was expected but it was not provided!, \
             opcuaSecurityPolicy was expected but it was not provided!"
        );
        assert!(errors.mentions("opcuaSecurityPolicy"));
        assert!(!errors.mentions("opcuaSecurityMode"));
    }

    #[test]
    fn test_agent_error_from_protocol() {
        let error: AgentError =
            OpcUaError::connection(ConnectionError::failed("opc.tcp://plc:4840", "refused")).into();
        assert_eq!(error.error_type(), "protocol");
        assert!(error.to_string().starts_with("OPC UA error:"));
    }

    #[test]
    fn test_retryable() {
        assert!(AgentError::forwarding("Tank:1", "sink down").is_retryable());
        assert!(!AgentError::framework("not active").is_retryable());
        assert!(!AgentError::from(ValidationErrors::new()).is_retryable());
    }

    #[test]
    fn test_invalid_state_message() {
        let error = AgentError::invalid_state("Stopped", "Running");
        assert_eq!(error.to_string(), "Invalid state: expected Stopped, was Running");
    }
}
