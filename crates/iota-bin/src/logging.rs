// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Logging initialization.
//!
//! `RUST_LOG`, when set, takes precedence over the configured level. With
//! `iota.log_file` enabled every record is also written as JSON to
//! `logs/log.json`, and error records additionally to `logs/error.json`.
//!
//! File records go through `tracing-appender` background writers. The
//! [`LoggingGuard`] returned by [`init_logging`] flushes them on drop and
//! must live as long as the process logs.

use std::path::Path;

use iota_config::{LogFormat, LogLevel};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::error::{BinError, BinResult};

/// Directory holding the JSON log files.
pub const LOG_DIR: &str = "logs";

/// File receiving every record.
pub const LOG_FILE: &str = "log.json";

/// File receiving error records.
pub const ERROR_FILE: &str = "error.json";

/// Third-party targets kept quiet regardless of the configured level.
const QUIET_TARGETS: &[&str] = &["opcua=warn", "hyper=warn"];

/// Options for [`init_logging`].
#[derive(Debug, Clone, Copy)]
pub struct LoggingOptions {
    /// Configured level.
    pub level: LogLevel,
    /// Console format.
    pub format: LogFormat,
    /// Also write JSON files under [`LOG_DIR`].
    pub log_file: bool,
}

/// Keeps the file writers running. Dropping it flushes pending records.
#[derive(Default)]
#[must_use = "dropping the guard stops the log file writers"]
pub struct LoggingGuard {
    _workers: Vec<WorkerGuard>,
}

impl std::fmt::Debug for LoggingGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggingGuard")
            .field("workers", &self._workers.len())
            .finish()
    }
}

/// Initializes the global subscriber.
///
/// # Errors
///
/// Fails if the log files cannot be opened or a global subscriber is
/// already installed.
pub fn init_logging(options: LoggingOptions) -> BinResult<LoggingGuard> {
    let filter = build_filter(options.level);
    let (files, guard) = if options.log_file {
        let (layer, guard) = file_layers(Path::new(LOG_DIR))?;
        (Some(layer), guard)
    } else {
        (None, LoggingGuard::default())
    };

    let result = match options.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(files)
            .with(filter)
            .with(fmt::layer().json().with_target(true).with_current_span(true))
            .try_init(),
        LogFormat::Compact => tracing_subscriber::registry()
            .with(files)
            .with(filter)
            .with(fmt::layer().compact().with_target(false))
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(files)
            .with(filter)
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .try_init(),
    };

    result.map_err(|e| BinError::startup(format!("failed to install logger: {}", e)))?;

    tracing::debug!(
        level = %options.level,
        format = ?options.format,
        log_file = options.log_file,
        "Logging initialized"
    );
    Ok(guard)
}

/// Builds the level filter. `RUST_LOG` wins over `level`.
pub fn build_filter(level: LogLevel) -> EnvFilter {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_filter()));

    QUIET_TARGETS
        .iter()
        .filter_map(|directive| directive.parse().ok())
        .fold(filter, |filter, directive| filter.add_directive(directive))
}

/// JSON layers writing to `dir/log.json` and, for errors, `dir/error.json`.
///
/// Installed directly on the registry; the global level filter still
/// applies to them.
fn file_layers(dir: &Path) -> BinResult<(impl Layer<Registry>, LoggingGuard)> {
    let (all, all_worker) = tracing_appender::non_blocking(appender(dir, LOG_FILE)?);
    let (errors, error_worker) = tracing_appender::non_blocking(appender(dir, ERROR_FILE)?);

    let all_layer = fmt::layer().json().with_ansi(false).with_writer(all);
    let error_layer = fmt::layer()
        .json()
        .with_ansi(false)
        .with_writer(errors)
        .with_filter(LevelFilter::ERROR);

    let guard = LoggingGuard {
        _workers: vec![all_worker, error_worker],
    };
    Ok((all_layer.and_then(error_layer), guard))
}

/// Appends to `dir/file_name`, creating both as needed. Never rotates.
fn appender(dir: &Path, file_name: &str) -> BinResult<RollingFileAppender> {
    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name)
        .build(dir)
        .map_err(|e| {
            BinError::startup(format!(
                "cannot open log file {}: {}",
                dir.join(file_name).display(),
                e
            ))
        })
}

/// Resolves the effective level: the CLI flag if given, else the configured one.
///
/// # Errors
///
/// Returns a configuration error for an unknown level name.
pub fn effective_level(cli: Option<&str>, configured: LogLevel) -> BinResult<LogLevel> {
    match cli {
        Some(name) => name.parse().map_err(BinError::from),
        None => Ok(configured),
    }
}
