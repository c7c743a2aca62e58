//! Log setup for blobprocd.
//!
//! Two independent outputs:
//!
//! - the structured log: JSON lines to stderr or an append-mode file, at
//!   `INFO` (or `DEBUG` with `[log].debug`), overridable via `RUST_LOG`;
//! - the access log: one line per HTTP request, emitted under the
//!   [`ACCESS_LOG_TARGET`] target, written to `[log].access_log` and
//!   discarded when that is unset. Access events never reach the
//!   structured log.

use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing::Level;
use tracing_subscriber::filter::{EnvFilter, Targets};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::prelude::*;

use crate::config::LogConfig;

/// `tracing` target of per-request access events.
pub const ACCESS_LOG_TARGET: &str = "access";

/// Install the global subscriber. Call once, early in `main`.
pub fn init(config: &LogConfig) -> Result<()> {
    let level = if config.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level))
        .add_directive(format!("{}=off", ACCESS_LOG_TARGET).parse()?);

    let writer = match &config.file {
        Some(path) => BoxMakeWriter::new(Mutex::new(open_append(path)?)),
        None => BoxMakeWriter::new(std::io::stderr),
    };
    let main_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(writer)
        .with_filter(filter);

    let access_layer = match &config.access_log {
        Some(path) => Some(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(Mutex::new(open_append(path)?))
                .with_filter(Targets::new().with_target(ACCESS_LOG_TARGET, Level::INFO)),
        ),
        None => None,
    };

    tracing_subscriber::registry()
        .with(main_layer)
        .with(access_layer)
        .try_init()
        .context("failed to install log subscriber")?;
    Ok(())
}

fn open_append(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file: {}", path.display()))
}
