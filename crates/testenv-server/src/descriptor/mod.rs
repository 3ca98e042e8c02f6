//! Typed, validated launch configuration for one managed server.
//!
//! Batch files reach this crate as loosely-typed mappings. Validation turns
//! each entry into an immutable [`ServerDescriptor`] before any process is
//! spawned, so a misconfigured environment fails with a field-specific
//! [`ConfigError`] instead of a half-started batch.

mod context;
mod errors;
mod fields;
mod validate;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use strum::{AsRefStr, Display, EnumString};

use crate::emitter::{ConfigTree, ConfigWriteError, ConfigWriter};
use crate::probe::SocketEndpoint;

pub use context::DescriptorContext;
pub use errors::ConfigError;

/// Closed set of server variants.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, AsRefStr, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ServerKind {
    /// Command with optional config file and output captured to log files.
    #[default]
    Generic,
    /// Bare command sharing the parent's output streams.
    Base,
}

/// Config file emitted into the server directory before start.
#[derive(Debug, Clone)]
pub struct ConfigSpec {
    format: String,
    file: PathBuf,
    tree: ConfigTree,
    writer: ConfigWriter,
}

impl ConfigSpec {
    /// Format tag the writer was looked up by.
    #[must_use]
    pub fn format(&self) -> &str {
        &self.format
    }

    /// Absolute path of the emitted file.
    #[must_use]
    pub fn file(&self) -> &Path {
        &self.file
    }

    /// Tree handed to the writer.
    #[must_use]
    pub fn tree(&self) -> &ConfigTree {
        &self.tree
    }

    /// Serialises the tree to [`ConfigSpec::file`].
    ///
    /// # Errors
    ///
    /// Propagates the writer's [`ConfigWriteError`].
    pub fn write(&self) -> Result<(), ConfigWriteError> {
        self.writer.write(&self.file, &self.tree)
    }
}

/// Validated launch configuration for one server.
///
/// Relative `stdout`, `stderr`, `pidfile` and config paths are already
/// resolved against [`ServerDescriptor::basedir`].
#[derive(Debug, Clone)]
pub struct ServerDescriptor {
    name: String,
    kind: ServerKind,
    basedir: PathBuf,
    program: PathBuf,
    args: Vec<String>,
    config: Option<ConfigSpec>,
    stdout: Option<PathBuf>,
    stderr: Option<PathBuf>,
    environ: BTreeMap<String, String>,
    clear_environ: bool,
    pidfile: Option<PathBuf>,
    address: Option<SocketEndpoint>,
    start_timeout: Duration,
    after: Vec<String>,
    extra: ConfigTree,
}

impl ServerDescriptor {
    /// Unique server name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Server variant.
    #[must_use]
    pub const fn kind(&self) -> ServerKind {
        self.kind
    }

    /// Private working directory, `run_dir/name`.
    #[must_use]
    pub fn basedir(&self) -> &Path {
        &self.basedir
    }

    /// Absolute path of the executable.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Arguments passed after the program.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Program and arguments joined by single spaces, as logged at start.
    #[must_use]
    pub fn command_line(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }

    /// Config file to emit during prepare, if any.
    #[must_use]
    pub const fn config(&self) -> Option<&ConfigSpec> {
        self.config.as_ref()
    }

    /// File receiving standard output; `None` inherits the parent's.
    #[must_use]
    pub fn stdout(&self) -> Option<&Path> {
        self.stdout.as_deref()
    }

    /// File receiving standard error; `None` inherits the parent's.
    #[must_use]
    pub fn stderr(&self) -> Option<&Path> {
        self.stderr.as_deref()
    }

    /// Environment overrides with stringified values.
    #[must_use]
    pub const fn environ(&self) -> &BTreeMap<String, String> {
        &self.environ
    }

    /// Whether the parent environment is dropped before overrides apply.
    #[must_use]
    pub const fn clear_environ(&self) -> bool {
        self.clear_environ
    }

    /// File the server writes its PID to, if it daemonises.
    #[must_use]
    pub fn pidfile(&self) -> Option<&Path> {
        self.pidfile.as_deref()
    }

    /// Endpoint that accepts connections once the server is ready.
    #[must_use]
    pub const fn address(&self) -> Option<&SocketEndpoint> {
        self.address.as_ref()
    }

    /// Bound for PID discovery and readiness polling.
    #[must_use]
    pub const fn start_timeout(&self) -> Duration {
        self.start_timeout
    }

    /// Names of servers that must be ready first.
    #[must_use]
    pub fn after(&self) -> &[String] {
        &self.after
    }

    /// Unrecognised keys retained verbatim.
    #[must_use]
    pub const fn extra(&self) -> &ConfigTree {
        &self.extra
    }
}
