// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `run` command.

use iota_config::LogFormat;

use crate::cli::{Cli, RunArgs};
use crate::error::BinResult;
use crate::logging::{effective_level, init_logging, LoggingOptions};
use crate::runtime::RuntimeBuilder;

/// Executes the `run` command to start the agent.
///
/// The configuration is loaded first since it decides the log level, the
/// format and whether the JSON log files are written. The logging guard is
/// held until the agent has stopped.
pub async fn run(cli: &Cli, args: RunArgs) -> BinResult<()> {
    let runtime = RuntimeBuilder::new()
        .config_path(&cli.config)
        .simulate(args.simulate)
        .build()?;

    let config = runtime.config();
    let _logging = init_logging(LoggingOptions {
        level: effective_level(cli.log_level.as_deref(), config.iota.log_level)?,
        format: cli.log_format.map(LogFormat::from).unwrap_or(config.logging.format),
        log_file: config.iota.log_file,
    })?;

    tracing::info!(config = %cli.config.display(), "Configuration loaded");

    runtime.run().await
}
