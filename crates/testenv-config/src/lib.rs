//! Run-level configuration shared by the testenv crates.
//!
//! A [`RunConfig`] describes where a test run keeps its server directories,
//! where relative server commands are looked up, how long servers may take
//! to start by default, and how diagnostics are logged. Batch descriptor
//! files are loaded elsewhere; this crate only covers the ambient settings
//! that apply to every server in a run.
//!
//! Values are layered by `ortho_config`: built-in defaults, then an
//! optional `.testenv.toml` (or the file named by `TESTENV_CONFIG_PATH`),
//! then `TESTENV_*` environment variables, then command-line flags.

mod defaults;
mod logging;
mod runtime;

use std::ffi::OsString;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::{OrthoConfig, OrthoError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use defaults::{
    DEFAULT_LOG_FILTER, DEFAULT_START_TIMEOUT_SECS, default_base_dir, default_conf_dir,
    default_log_filter, default_log_format, default_start_timeout_secs,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use runtime::{RunPaths, RunPathsError};

/// Program name handed to the loader when no command line is parsed.
const PROGRAM_NAME: &str = "testenv";

/// Environment variable overriding [`RunConfig::base_dir`].
pub const BASE_DIR_ENV: &str = "TESTENV_BASE_DIR";
/// Environment variable overriding [`RunConfig::conf_dir`].
pub const CONF_DIR_ENV: &str = "TESTENV_CONF_DIR";
/// Environment variable overriding [`RunConfig::start_timeout_secs`].
pub const START_TIMEOUT_ENV: &str = "TESTENV_START_TIMEOUT_SECS";
/// Environment variable overriding [`RunConfig::log_filter`].
pub const LOG_FILTER_ENV: &str = "TESTENV_LOG_FILTER";
/// Environment variable overriding [`RunConfig::log_format`].
pub const LOG_FORMAT_ENV: &str = "TESTENV_LOG_FORMAT";
/// Environment variable naming an explicit configuration file.
pub const CONFIG_PATH_ENV: &str = "TESTENV_CONFIG_PATH";

/// Settings shared by every server in a run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[serde(default)]
#[ortho_config(prefix = "TESTENV")]
pub struct RunConfig {
    /// Directory beneath which each run creates its own directory.
    pub base_dir: Utf8PathBuf,
    /// Directory used to resolve relative server commands.
    pub conf_dir: Utf8PathBuf,
    /// Start timeout applied to servers that do not set their own.
    pub start_timeout_secs: u64,
    /// `tracing` filter expression.
    pub log_filter: String,
    /// Log output format.
    pub log_format: LogFormat,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            conf_dir: default_conf_dir(),
            start_timeout_secs: default_start_timeout_secs(),
            log_filter: default_log_filter(),
            log_format: default_log_format(),
        }
    }
}

impl RunConfig {
    /// Loads the layered configuration without reading command-line flags.
    ///
    /// Test binaries own their argument list, so only defaults, the
    /// configuration file and `TESTENV_*` variables apply.
    ///
    /// # Errors
    ///
    /// Returns [`RunConfigError::Load`] when a layer fails to parse or a
    /// value does not fit its field.
    pub fn from_env() -> Result<Self, RunConfigError> {
        Self::from_args([OsString::from(PROGRAM_NAME)])
    }

    /// Loads the layered configuration, taking flags such as
    /// `--start-timeout-secs` from `args`. The first item is the program
    /// name.
    ///
    /// # Errors
    ///
    /// Returns [`RunConfigError::Load`] when a layer fails to parse or a
    /// value does not fit its field.
    pub fn from_args<I, T>(args: I) -> Result<Self, RunConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        Self::load_from_iter(args).map_err(RunConfigError::from)
    }

    /// Directory beneath which each run creates its own directory.
    #[must_use]
    pub fn base_dir(&self) -> &Utf8Path {
        self.base_dir.as_path()
    }

    /// Directory used to resolve relative server commands.
    #[must_use]
    pub fn conf_dir(&self) -> &Utf8Path {
        self.conf_dir.as_path()
    }

    /// Start timeout applied to servers that do not set their own.
    #[must_use]
    pub const fn start_timeout_secs(&self) -> u64 {
        self.start_timeout_secs
    }

    /// `tracing` filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }
}

/// Errors raised while loading a [`RunConfig`].
#[derive(Debug, Error)]
pub enum RunConfigError {
    /// A configuration layer failed to load.
    #[error("failed to load run configuration: {source}")]
    Load {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
}

impl From<Arc<OrthoError>> for RunConfigError {
    fn from(source: Arc<OrthoError>) -> Self {
        Self::Load { source }
    }
}
