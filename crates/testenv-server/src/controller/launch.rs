//! Builds the spawn command for a validated server.

use std::env;
use std::fs::File;
use std::path::Path;
use std::process::{Command, Stdio};

use super::LifecycleError;
use crate::descriptor::ServerDescriptor;
use crate::environment::compose_environment;

/// Output capture for one server, owned by the child once spawned.
pub(super) struct Outputs {
    pub(super) stdout: Stdio,
    pub(super) stderr: Stdio,
}

impl Outputs {
    /// Opens the configured output files, truncating previous contents.
    ///
    /// When stdout and stderr name the same file they share one handle so
    /// the two streams interleave instead of overwriting each other.
    pub(super) fn open(descriptor: &ServerDescriptor) -> Result<Self, LifecycleError> {
        let stdout_file = descriptor
            .stdout()
            .map(|path| create(descriptor, path))
            .transpose()?;
        let stderr_file = match (descriptor.stderr(), &stdout_file) {
            (None, _) => None,
            (Some(path), Some(shared)) if Some(path) == descriptor.stdout() => Some(
                shared
                    .try_clone()
                    .map_err(|source| open_error(descriptor, path, source))?,
            ),
            (Some(path), _) => Some(create(descriptor, path)?),
        };
        Ok(Self {
            stdout: stdout_file.map_or_else(Stdio::inherit, Stdio::from),
            stderr: stderr_file.map_or_else(Stdio::inherit, Stdio::from),
        })
    }
}

/// Builds the command: explicit argv, private directory as cwd, null stdin
/// and the composed environment.
pub(super) fn command(descriptor: &ServerDescriptor, outputs: Outputs) -> Command {
    let mut command = Command::new(descriptor.program());
    command
        .args(descriptor.args())
        .current_dir(descriptor.basedir())
        .stdin(Stdio::null())
        .stdout(outputs.stdout)
        .stderr(outputs.stderr)
        .env_clear()
        .envs(compose_environment(
            env::vars_os(),
            descriptor.environ(),
            descriptor.clear_environ(),
        ));
    command
}

fn create(descriptor: &ServerDescriptor, path: &Path) -> Result<File, LifecycleError> {
    File::create(path).map_err(|source| open_error(descriptor, path, source))
}

fn open_error(
    descriptor: &ServerDescriptor,
    path: &Path,
    source: std::io::Error,
) -> LifecycleError {
    LifecycleError::OpenOutput {
        server: descriptor.name().to_owned(),
        path: path.to_path_buf(),
        source,
    }
}
