// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # iota-bin
//!
//! CLI binary for the OPC UA IoT Agent.
//!
//! - CLI argument parsing with clap
//! - Agent runtime orchestration
//! - Graceful shutdown handling
//! - Logging initialization
//!
//! ## Architecture
//!
//! ```text
//!                     main.rs
//!                        │
//!                     cli.rs
//!                        │
//!          ┌─────────────┼─────────────┐
//!          ▼             ▼             ▼
//!     commands        runtime       logging
//!                        │
//!                 ┌──────┴──────┐
//!                 ▼             ▼
//!             shutdown      iota-core
//!                        (agent, pool, bindings)
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Start the agent (default command)
//! iota-opcua-agent -c config.yaml
//!
//! # Start against the simulated transport
//! iota-opcua-agent run --simulate
//!
//! # Validate configuration and device parameters
//! iota-opcua-agent validate -f json
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod runtime;
pub mod shutdown;

pub use cli::{Cli, Commands};
pub use error::{BinError, BinResult};
pub use logging::{init_logging, LoggingGuard, LoggingOptions};
pub use runtime::{AgentRuntime, RuntimeBuilder};
pub use shutdown::ShutdownCoordinator;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
