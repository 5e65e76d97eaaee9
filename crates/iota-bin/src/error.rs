// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Error types for the agent binary.
//!
//! # Exit Codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | Success |
//! | 1 | Other failure |
//! | 2 | Configuration |
//! | 3 | Startup |

use thiserror::Error;

/// Result type alias for iota-bin operations.
pub type BinResult<T> = Result<T, BinError>;

/// Errors that can occur in the agent binary.
#[derive(Debug, Error)]
pub enum BinError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Startup error.
    #[error("Startup error: {0}")]
    Startup(String),

    /// Runtime error.
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),

    /// Config loading error.
    #[error("Config error: {0}")]
    Config(#[from] iota_config::ConfigError),

    /// Agent error.
    #[error("Agent error: {0}")]
    Agent(#[from] iota_core::AgentError),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        /// The context description.
        context: String,
        /// The underlying error.
        #[source]
        source: Box<BinError>,
    },
}

impl BinError {
    /// Creates a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Creates a startup error.
    pub fn startup(msg: impl Into<String>) -> Self {
        Self::Startup(msg.into())
    }

    /// Creates a runtime error.
    pub fn runtime(msg: impl Into<String>) -> Self {
        Self::Runtime(msg.into())
    }

    /// Adds context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Returns the exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) | Self::Config(_) => 2,
            Self::Startup(_) | Self::Agent(_) => 3,
            Self::Runtime(_) | Self::Io(_) => 1,
            Self::WithContext { source, .. } => source.exit_code(),
        }
    }
}

impl From<std::io::Error> for BinError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<anyhow::Error> for BinError {
    fn from(err: anyhow::Error) -> Self {
        Self::Runtime(format!("{:#}", err))
    }
}

// =============================================================================
// Error Reporting
// =============================================================================

/// Reports an error with its cause chain on stderr.
pub fn report_error(error: &BinError) {
    eprintln!("Error: {}", error);

    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        eprintln!("  Caused by: {}", cause);
        source = cause.source();
    }
}

/// Reports an error and exits with the appropriate code.
pub fn report_error_and_exit(error: BinError) -> ! {
    report_error(&error);
    std::process::exit(error.exit_code())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_error_with_context() {
        let err = BinError::config("missing file").with_context("loading agent.yaml");
        assert_eq!(err.to_string(), "loading agent.yaml: Configuration error: missing file");
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(BinError::config("x").exit_code(), 2);
        assert_eq!(BinError::from(iota_config::ConfigError::file_not_found("a.yaml")).exit_code(), 2);
        assert_eq!(BinError::startup("x").exit_code(), 3);
        assert_eq!(BinError::from(iota_core::AgentError::framework("x")).exit_code(), 3);
        assert_eq!(BinError::runtime("x").exit_code(), 1);
    }

    #[test]
    fn test_from_anyhow_keeps_chain() {
        let err: anyhow::Error = Err::<(), _>(std::io::Error::other("disk full"))
            .context("writing logs")
            .unwrap_err();
        let err = BinError::from(err);
        assert_eq!(err.to_string(), "Runtime error: writing logs: disk full");
    }
}
