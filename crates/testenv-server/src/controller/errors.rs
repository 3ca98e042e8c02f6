use std::error::Error as StdError;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use super::ServerState;
use crate::emitter::ConfigWriteError;

/// Errors raised while driving one server through its lifecycle.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The operation is not valid in the controller's current state.
    #[error("server {server}: cannot {operation} while {state}")]
    InvalidState {
        /// Server name.
        server: String,
        /// Attempted operation.
        operation: &'static str,
        /// State the controller was in.
        state: ServerState,
    },
    /// The private directory was left over from another server or run.
    #[error("server {server}: directory '{path}' already exists")]
    DirectoryExists {
        /// Server name.
        server: String,
        /// Private directory.
        path: PathBuf,
    },
    /// A directory could not be created.
    #[error("server {server}: failed to create directory '{path}': {source}")]
    CreateDirectory {
        /// Server name.
        server: String,
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The config file could not be written.
    #[error("server {server}: {source}")]
    ConfigWrite {
        /// Server name.
        server: String,
        /// Writer failure.
        #[source]
        source: ConfigWriteError,
    },
    /// An output capture file could not be opened.
    #[error("server {server}: failed to open output file '{path}': {source}")]
    OpenOutput {
        /// Server name.
        server: String,
        /// Output file.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The process could not be spawned.
    #[error("server {server}: failed to spawn '{command}': {source}")]
    Spawn {
        /// Server name.
        server: String,
        /// Command line that failed.
        command: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The pid file did not appear within the start timeout.
    #[error("server {server} didn't start (pidfile '{pidfile}') in {timeout_secs} seconds")]
    StartTimeout {
        /// Server name.
        server: String,
        /// Pid file that was polled.
        pidfile: PathBuf,
        /// Configured start timeout.
        timeout_secs: u64,
    },
    /// The readiness address never accepted a connection.
    #[error("server {server} didn't get ready on {address} in {timeout_secs} seconds")]
    ReadinessTimeout {
        /// Server name.
        server: String,
        /// Readiness address.
        address: String,
        /// Configured start timeout.
        timeout_secs: u64,
    },
    /// Start diagnostics could not be written.
    #[error("server {server}: failed to write start diagnostics: {source}")]
    Diagnostics {
        /// Server name.
        server: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// A fill or ctrl hook failed.
    #[error("server {server}: {hook} hook failed: {source}")]
    Hook {
        /// Server name.
        server: String,
        /// Hook that failed.
        hook: &'static str,
        /// Hook failure.
        #[source]
        source: HookError,
    },
}

/// Failure reported by a [`ServerHooks`](super::ServerHooks) implementation.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HookError {
    message: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl HookError {
    /// Builds an error from a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Builds an error wrapping an underlying cause.
    #[must_use]
    pub fn with_source(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Human-readable description.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}
