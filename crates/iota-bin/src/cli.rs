// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! CLI argument parsing and command definitions.
//!
//! - `run`: Start the agent (default)
//! - `validate`: Validate the configuration and the configured devices
//! - `version`: Show version information

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use iota_config::LogFormat as ConfigLogFormat;

// =============================================================================
// Main CLI Structure
// =============================================================================

/// OPC UA IoT Agent
///
/// Bridges OPC UA servers into a context broker: one session per endpoint,
/// one monitored item per provisioned attribute.
#[derive(Parser, Debug)]
#[command(
    name = "iota-opcua-agent",
    author = "Sylvex",
    version = crate::VERSION,
    about = "OPC UA IoT Agent",
    long_about = None,
    propagate_version = true
)]
pub struct Cli {
    /// Configuration file path (.yaml, .yml, .toml or .json)
    #[arg(
        short,
        long,
        default_value = "config.yaml",
        env = "IOTA_CONFIG",
        global = true
    )]
    pub config: PathBuf,

    /// Log level (SILLY, DEBUG, VERBOSE, INFO, WARN, ERROR); overrides the configuration
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Log format; overrides the configuration
    #[arg(long, global = true)]
    pub log_format: Option<LogFormat>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

// =============================================================================
// Subcommands
// =============================================================================

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the agent
    ///
    /// This is the default command when no subcommand is specified. The
    /// agent runs until SIGINT or SIGTERM.
    Run(RunArgs),

    /// Validate the configuration file
    ///
    /// Loads the configuration and resolves the connection parameters of
    /// every configured device without connecting to anything.
    Validate(ValidateArgs),

    /// Show version information
    Version,
}

/// Arguments for the `run` command.
#[derive(Args, Debug, Default, Clone)]
pub struct RunArgs {
    /// Use the in-process simulated OPC UA transport
    #[arg(long, env = "IOTA_SIMULATE")]
    pub simulate: bool,
}

/// Arguments for the `validate` command.
#[derive(Args, Debug, Default, Clone)]
pub struct ValidateArgs {
    /// Output format for validation results
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,
}

// =============================================================================
// Enums
// =============================================================================

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable multi-line format
    Pretty,
    /// Single-line format
    Compact,
    /// JSON format for log aggregation
    Json,
}

impl From<LogFormat> for ConfigLogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Pretty => ConfigLogFormat::Pretty,
            LogFormat::Compact => ConfigLogFormat::Compact,
            LogFormat::Json => ConfigLogFormat::Json,
        }
    }
}

/// Output format for command results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON format for programmatic parsing
    Json,
}

// =============================================================================
// Helper Methods
// =============================================================================

impl Cli {
    /// Parse CLI arguments from the command line.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the effective command, defaulting to `Run` if none specified.
    pub fn effective_command(&self) -> Commands {
        self.command
            .clone()
            .unwrap_or_else(|| Commands::Run(RunArgs::default()))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command() {
        let cli = Cli::parse_from(["iota-opcua-agent"]);
        assert!(cli.command.is_none());
        assert!(matches!(cli.effective_command(), Commands::Run(_)));
    }

    #[test]
    fn test_run_simulate() {
        let cli = Cli::parse_from(["iota-opcua-agent", "run", "--simulate"]);
        match cli.command {
            Some(Commands::Run(args)) => assert!(args.simulate),
            other => panic!("Expected Run command, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_command() {
        let cli = Cli::parse_from(["iota-opcua-agent", "validate", "-f", "json"]);
        match cli.command {
            Some(Commands::Validate(args)) => assert_eq!(args.format, OutputFormat::Json),
            other => panic!("Expected Validate command, got {:?}", other),
        }
    }

    #[test]
    fn test_global_options() {
        let cli = Cli::parse_from([
            "iota-opcua-agent",
            "-c",
            "/etc/iota/agent.toml",
            "--log-level",
            "verbose",
            "--log-format",
            "json",
            "version",
        ]);
        assert_eq!(cli.config, PathBuf::from("/etc/iota/agent.toml"));
        assert_eq!(cli.log_level.as_deref(), Some("verbose"));
        assert_eq!(cli.log_format, Some(LogFormat::Json));
        assert!(matches!(cli.command, Some(Commands::Version)));
    }
}
