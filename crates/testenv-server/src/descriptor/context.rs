use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use testenv_config::{DEFAULT_START_TIMEOUT_SECS, RunConfig, RunPaths};

use crate::emitter::EmitterRegistry;

/// Run-wide inputs to descriptor validation.
#[derive(Debug, Clone)]
pub struct DescriptorContext {
    run_dir: PathBuf,
    conf_dir: PathBuf,
    default_start_timeout: Duration,
    emitters: EmitterRegistry,
    search_path: Option<OsString>,
}

impl DescriptorContext {
    /// Builds a context with the built-in emitters, the default start
    /// timeout and the current process `PATH`.
    #[must_use]
    pub fn new(run_dir: impl Into<PathBuf>, conf_dir: impl Into<PathBuf>) -> Self {
        Self {
            run_dir: run_dir.into(),
            conf_dir: conf_dir.into(),
            default_start_timeout: Duration::from_secs(DEFAULT_START_TIMEOUT_SECS),
            emitters: EmitterRegistry::new(),
            search_path: env::var_os("PATH"),
        }
    }

    /// Builds a context from a created run directory and its configuration.
    #[must_use]
    pub fn from_run_paths(paths: &RunPaths, config: &RunConfig) -> Self {
        Self::new(paths.run_dir(), paths.conf_dir())
            .with_start_timeout(Duration::from_secs(config.start_timeout_secs()))
    }

    /// Replaces the start timeout used when a server sets none.
    #[must_use]
    pub const fn with_start_timeout(mut self, timeout: Duration) -> Self {
        self.default_start_timeout = timeout;
        self
    }

    /// Replaces the search path used for bare command names.
    #[must_use]
    pub fn with_search_path(mut self, search_path: Option<OsString>) -> Self {
        self.search_path = search_path;
        self
    }

    /// Replaces the emitter registry.
    #[must_use]
    pub fn with_emitters(mut self, emitters: EmitterRegistry) -> Self {
        self.emitters = emitters;
        self
    }

    /// Directory holding one private directory per server.
    #[must_use]
    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Directory relative commands are resolved against.
    #[must_use]
    pub fn conf_dir(&self) -> &Path {
        &self.conf_dir
    }

    /// Start timeout applied when a server sets none.
    #[must_use]
    pub const fn default_start_timeout(&self) -> Duration {
        self.default_start_timeout
    }

    /// Config writers available to servers.
    #[must_use]
    pub const fn emitters(&self) -> &EmitterRegistry {
        &self.emitters
    }

    /// Mutable access for registering extra config formats.
    pub fn emitters_mut(&mut self) -> &mut EmitterRegistry {
        &mut self.emitters
    }

    /// Search path used for bare command names.
    #[must_use]
    pub fn search_path(&self) -> Option<&OsString> {
        self.search_path.as_ref()
    }
}
