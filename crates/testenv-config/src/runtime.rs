//! Derives the per-run directory that holds every server's private directory.
//!
//! Each run gets a fresh directory beneath the configured base directory so
//! servers from concurrent or earlier runs never share working directories.

use std::fs::{self, DirBuilder};
use std::io;
use std::path::{Path, PathBuf};
use std::process;
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

use crate::RunConfig;

/// Directories owned by a single run.
#[derive(Debug, Clone)]
pub struct RunPaths {
    run_dir: PathBuf,
    conf_dir: PathBuf,
}

impl RunPaths {
    /// Creates a fresh run directory under the configured base directory.
    ///
    /// # Errors
    ///
    /// Returns [`RunPathsError::BaseDirectory`] when the base directory cannot
    /// be created and [`RunPathsError::RunDirectory`] when the run directory
    /// cannot be created or already exists.
    pub fn create(config: &RunConfig) -> Result<Self, RunPathsError> {
        let base = config.base_dir().as_std_path();
        fs::create_dir_all(base).map_err(|source| RunPathsError::BaseDirectory {
            path: base.to_path_buf(),
            source,
        })?;
        let run_dir = base.join(run_directory_name());
        let mut builder = DirBuilder::new();
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o700);
        }
        builder
            .create(&run_dir)
            .map_err(|source| RunPathsError::RunDirectory {
                path: run_dir.clone(),
                source,
            })?;
        Ok(Self {
            run_dir,
            conf_dir: config.conf_dir().as_std_path().to_path_buf(),
        })
    }

    /// Wraps existing directories without touching the filesystem.
    #[must_use]
    pub fn from_parts(run_dir: impl Into<PathBuf>, conf_dir: impl Into<PathBuf>) -> Self {
        Self {
            run_dir: run_dir.into(),
            conf_dir: conf_dir.into(),
        }
    }

    /// Directory holding one private subdirectory per server.
    #[must_use]
    pub fn run_dir(&self) -> &Path {
        self.run_dir.as_path()
    }

    /// Directory against which relative server commands are resolved.
    #[must_use]
    pub fn conf_dir(&self) -> &Path {
        self.conf_dir.as_path()
    }

    /// Removes the run directory and everything beneath it.
    ///
    /// # Errors
    ///
    /// Returns [`RunPathsError::Cleanup`] when removal fails for any reason
    /// other than the directory already being gone.
    pub fn remove(&self) -> Result<(), RunPathsError> {
        match fs::remove_dir_all(&self.run_dir) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(RunPathsError::Cleanup {
                path: self.run_dir.clone(),
                source,
            }),
        }
    }
}

fn run_directory_name() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.subsec_nanos());
    format!("run-{}-{nanos}", process::id())
}

/// Errors raised while preparing run directories.
#[derive(Debug, Error)]
pub enum RunPathsError {
    /// The base directory could not be created.
    #[error("failed to prepare base directory '{path}': {source}")]
    BaseDirectory {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The run directory could not be created.
    #[error("failed to create run directory '{path}': {source}")]
    RunDirectory {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The run directory could not be removed.
    #[error("failed to remove run directory '{path}': {source}")]
    Cleanup {
        /// Directory that could not be removed.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> RunConfig {
        let base = Utf8PathBuf::from_path_buf(dir.path().join("base")).expect("utf8 temp path");
        RunConfig {
            base_dir: base,
            ..RunConfig::default()
        }
    }

    #[test]
    fn creates_fresh_run_directory_under_base() {
        let dir = TempDir::new().expect("temp dir");
        let config = config_in(&dir);
        let paths = RunPaths::create(&config).expect("run paths");
        assert!(paths.run_dir().is_dir());
        assert!(paths.run_dir().starts_with(dir.path().join("base")));
        let name = paths
            .run_dir()
            .file_name()
            .and_then(|name| name.to_str())
            .expect("run dir name");
        assert!(name.starts_with("run-"), "unexpected run dir: {name}");
    }

    #[test]
    fn remove_is_idempotent() {
        let dir = TempDir::new().expect("temp dir");
        let paths = RunPaths::create(&config_in(&dir)).expect("run paths");
        paths.remove().expect("first removal");
        assert!(!paths.run_dir().exists());
        paths.remove().expect("second removal");
    }
}
