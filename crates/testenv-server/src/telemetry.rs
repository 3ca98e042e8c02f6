//! Diagnostics for a test run.
//!
//! Events go to standard error and, once a run directory exists, to
//! `testenv.log` inside it, so the log survives next to the servers' own
//! output files. Timestamps are elapsed time since installation, which lines
//! up directly with start timeouts. Controller events carry a `server` span.

use std::fs::{File, OpenOptions};
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use once_cell::sync::OnceCell;
use testenv_config::{LogFormat, RunConfig, RunPaths};
use thiserror::Error;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::Uptime;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::fmt;

/// Name of the run log created inside the run directory.
pub const RUN_LOG_FILE: &str = "testenv.log";

static INSTALLED: OnceCell<TelemetryHandle> = OnceCell::new();

/// Describes the subscriber installed for this process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryHandle {
    log_file: Option<PathBuf>,
}

impl TelemetryHandle {
    /// Run log receiving a copy of every event, if one was attached.
    #[must_use]
    pub fn log_file(&self) -> Option<&Path> {
        self.log_file.as_deref()
    }
}

/// Errors encountered while configuring telemetry.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The configured filter expression did not parse.
    #[error("invalid log filter '{filter}': {message}")]
    Filter {
        /// Rejected expression.
        filter: String,
        /// Parser message.
        message: String,
    },
    /// The run log could not be opened.
    #[error("failed to open run log '{path}': {source}")]
    LogFile {
        /// Run log path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Another global subscriber was already installed.
    #[error("failed to install telemetry subscriber: {0}")]
    Install(#[from] SetGlobalDefaultError),
}

/// Installs the process-wide subscriber for a test run.
///
/// Only the first call installs anything; later calls return the first
/// handle whatever their arguments. Pass the run's paths to also append
/// events to [`RUN_LOG_FILE`] in the run directory.
///
/// # Errors
///
/// Returns [`TelemetryError::Filter`] for a malformed filter,
/// [`TelemetryError::LogFile`] when the run log cannot be opened and
/// [`TelemetryError::Install`] when a different subscriber is already
/// installed.
pub fn initialise(
    config: &RunConfig,
    paths: Option<&RunPaths>,
) -> Result<TelemetryHandle, TelemetryError> {
    INSTALLED.get_or_try_init(|| install(config, paths)).cloned()
}

fn install(
    config: &RunConfig,
    paths: Option<&RunPaths>,
) -> Result<TelemetryHandle, TelemetryError> {
    let filter = run_filter(config.log_filter())?;
    let log_file = paths.map(|paths| paths.run_dir().join(RUN_LOG_FILE));
    let file = log_file.as_deref().map(open_run_log).transpose()?;
    let ansi = file.is_none() && io::stderr().is_terminal();
    let writer = match file {
        Some(file) => BoxMakeWriter::new(io::stderr.and(Mutex::new(file))),
        None => BoxMakeWriter::new(io::stderr),
    };

    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(ansi)
        .with_timer(Uptime::default());
    match config.log_format() {
        LogFormat::Json => tracing::subscriber::set_global_default(
            builder.json().flatten_event(true).finish(),
        )?,
        LogFormat::Compact => tracing::subscriber::set_global_default(builder.compact().finish())?,
    }
    Ok(TelemetryHandle { log_file })
}

fn run_filter(filter: &str) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_new(filter).map_err(|error| TelemetryError::Filter {
        filter: filter.to_owned(),
        message: error.to_string(),
    })
}

fn open_run_log(path: &Path) -> Result<File, TelemetryError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| TelemetryError::LogFile {
            path: path.to_path_buf(),
            source,
        })
}
