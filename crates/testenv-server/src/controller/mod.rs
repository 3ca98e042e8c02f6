//! Drives one server through prepare, start, readiness and stop.
//!
//! A [`ServerController`] owns its descriptor, the spawned process and the
//! process's output handles. The controller moves through
//! [`ServerState`] in one direction only; a stopped controller cannot be
//! restarted.

mod errors;
mod hooks;
mod launch;

use std::fs;
use std::io::{self, Write};
use std::process::Child;
use std::time::Duration;

use strum::Display;
use tracing::{Span, debug, info, info_span, warn};

use crate::descriptor::ServerDescriptor;
use crate::probe::{
    ProcessOwnership, StopOutcome, is_running, stop_with_signal, wait_for, wait_for_pid,
    wait_for_socket,
};

pub use errors::{HookError, LifecycleError};
pub use hooks::{NoopHooks, ServerHooks};

const CONTROLLER_TARGET: &str = "testenv_server::controller";

/// Lifecycle position of a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ServerState {
    /// Nothing on disk yet.
    Created,
    /// Private directory and config file written.
    Prepared,
    /// Process spawned.
    Started,
    /// Readiness check passed.
    Ready,
    /// Process stopped; terminal.
    Stopped,
}

/// Owner of one server process.
///
/// Start diagnostics (the command line and the resolved PID) are written to
/// `W`, the parent's standard error unless another writer is supplied.
/// Lifecycle operations run inside a `server` span, so process and socket
/// events they trigger name the server too.
pub struct ServerController<W: Write = io::Stderr> {
    descriptor: ServerDescriptor,
    state: ServerState,
    pid: Option<u32>,
    child: Option<Child>,
    hooks: Box<dyn ServerHooks + Send>,
    diagnostics: W,
    span: Span,
}

impl ServerController<io::Stderr> {
    /// Creates a controller reporting to standard error.
    #[must_use]
    pub fn new(descriptor: ServerDescriptor) -> Self {
        Self::with_diagnostics(descriptor, io::stderr())
    }
}

impl<W: Write> ServerController<W> {
    /// Creates a controller reporting start diagnostics to `diagnostics`.
    #[must_use]
    pub fn with_diagnostics(descriptor: ServerDescriptor, diagnostics: W) -> Self {
        let span = info_span!(target: CONTROLLER_TARGET, "server", server = %descriptor.name());
        Self {
            descriptor,
            state: ServerState::Created,
            pid: None,
            child: None,
            hooks: Box::new(NoopHooks),
            diagnostics,
            span,
        }
    }

    /// Replaces the fill/ctrl hooks.
    #[must_use]
    pub fn with_hooks(mut self, hooks: impl ServerHooks + Send + 'static) -> Self {
        self.hooks = Box::new(hooks);
        self
    }

    /// Validated description this controller runs.
    #[must_use]
    pub const fn descriptor(&self) -> &ServerDescriptor {
        &self.descriptor
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ServerState {
        self.state
    }

    /// Authoritative PID once known.
    #[must_use]
    pub const fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Writer receiving start diagnostics.
    #[must_use]
    pub const fn diagnostics(&self) -> &W {
        &self.diagnostics
    }

    /// Creates the private directory and writes the config file.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::DirectoryExists`] when the private
    /// directory is already present, [`LifecycleError::CreateDirectory`] or
    /// [`LifecycleError::ConfigWrite`] on filesystem failures, and
    /// [`LifecycleError::InvalidState`] unless the controller is new.
    pub fn prepare(&mut self) -> Result<(), LifecycleError> {
        let _entered = self.span.clone().entered();
        self.expect_state("prepare", &[ServerState::Created])?;
        let basedir = self.descriptor.basedir();
        if let Some(run_dir) = basedir.parent() {
            fs::create_dir_all(run_dir).map_err(|source| LifecycleError::CreateDirectory {
                server: self.descriptor.name().to_owned(),
                path: run_dir.to_path_buf(),
                source,
            })?;
        }
        fs::create_dir(basedir).map_err(|source| {
            if source.kind() == io::ErrorKind::AlreadyExists {
                LifecycleError::DirectoryExists {
                    server: self.descriptor.name().to_owned(),
                    path: basedir.to_path_buf(),
                }
            } else {
                LifecycleError::CreateDirectory {
                    server: self.descriptor.name().to_owned(),
                    path: basedir.to_path_buf(),
                    source,
                }
            }
        })?;
        if let Some(config) = self.descriptor.config() {
            config
                .write()
                .map_err(|source| LifecycleError::ConfigWrite {
                    server: self.descriptor.name().to_owned(),
                    source,
                })?;
            debug!(
                target: CONTROLLER_TARGET,
                server = self.descriptor.name(),
                format = config.format(),
                file = %config.file().display(),
                "config file written"
            );
        }
        self.state = ServerState::Prepared;
        info!(
            target: CONTROLLER_TARGET,
            server = self.descriptor.name(),
            basedir = %basedir.display(),
            "server prepared"
        );
        Ok(())
    }

    /// Spawns the server and resolves its PID.
    ///
    /// Without a pid file the spawned PID is authoritative. With one, the
    /// file is polled for up to the start timeout; the spawned launcher is
    /// kept either way so [`ServerController::stop`] can reap it.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::OpenOutput`], [`LifecycleError::Spawn`] or
    /// [`LifecycleError::Diagnostics`] when launching fails,
    /// [`LifecycleError::StartTimeout`] when the pid file never appears, and
    /// [`LifecycleError::InvalidState`] unless the controller is prepared.
    pub fn start(&mut self) -> Result<u32, LifecycleError> {
        let _entered = self.span.clone().entered();
        self.expect_state("start", &[ServerState::Prepared])?;
        let outputs = launch::Outputs::open(&self.descriptor)?;
        let command_line = self.descriptor.command_line();
        self.diagnostic_line(&command_line)?;
        let child = launch::command(&self.descriptor, outputs)
            .spawn()
            .map_err(|source| LifecycleError::Spawn {
                server: self.descriptor.name().to_owned(),
                command: command_line.clone(),
                source,
            })?;
        let spawned = child.id();
        self.child = Some(child);
        self.state = ServerState::Started;
        info!(
            target: CONTROLLER_TARGET,
            server = self.descriptor.name(),
            command = %command_line,
            pid = spawned,
            "server spawned"
        );

        let pid = match self.descriptor.pidfile() {
            None => spawned,
            Some(pidfile) => {
                let timeout = self.descriptor.start_timeout();
                wait_for_pid(pidfile, timeout).ok_or_else(|| {
                    warn!(
                        target: CONTROLLER_TARGET,
                        server = self.descriptor.name(),
                        pidfile = %pidfile.display(),
                        timeout_secs = timeout.as_secs(),
                        "pid file did not appear"
                    );
                    LifecycleError::StartTimeout {
                        server: self.descriptor.name().to_owned(),
                        pidfile: pidfile.to_path_buf(),
                        timeout_secs: timeout.as_secs(),
                    }
                })?
            }
        };
        self.pid = Some(pid);
        self.diagnostic_line(&format!("pid = {pid}"))?;
        info!(
            target: CONTROLLER_TARGET,
            server = self.descriptor.name(),
            pid,
            "server started"
        );
        Ok(pid)
    }

    /// Performs a single readiness check; servers without an address are
    /// always ready.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.descriptor
            .address()
            .is_none_or(|address| wait_for_socket(address, Duration::ZERO))
    }

    /// Polls [`ServerController::is_ready`] for up to the start timeout.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::ReadinessTimeout`] when the server never
    /// becomes ready and [`LifecycleError::InvalidState`] unless it has been
    /// started.
    pub fn wait_ready(&mut self) -> Result<(), LifecycleError> {
        let _entered = self.span.clone().entered();
        self.expect_state("wait for", &[ServerState::Started, ServerState::Ready])?;
        if self.state == ServerState::Ready {
            return Ok(());
        }
        let timeout = self.descriptor.start_timeout();
        if !wait_for(|| self.is_ready(), timeout) {
            let address = self
                .descriptor
                .address()
                .map(ToString::to_string)
                .unwrap_or_default();
            warn!(
                target: CONTROLLER_TARGET,
                server = self.descriptor.name(),
                address = %address,
                timeout_secs = timeout.as_secs(),
                "server did not become ready"
            );
            return Err(LifecycleError::ReadinessTimeout {
                server: self.descriptor.name().to_owned(),
                address,
                timeout_secs: timeout.as_secs(),
            });
        }
        self.state = ServerState::Ready;
        info!(
            target: CONTROLLER_TARGET,
            server = self.descriptor.name(),
            "server ready"
        );
        Ok(())
    }

    /// Runs the fill hook.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Hook`] when the hook fails and
    /// [`LifecycleError::InvalidState`] unless the server is running.
    pub fn fill(&mut self) -> Result<(), LifecycleError> {
        self.expect_state("fill", &[ServerState::Started, ServerState::Ready])?;
        self.hooks
            .fill(&self.descriptor, self.pid)
            .map_err(|source| LifecycleError::Hook {
                server: self.descriptor.name().to_owned(),
                hook: "fill",
                source,
            })
    }

    /// Runs the ctrl hook with `args`.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Hook`] when the hook fails and
    /// [`LifecycleError::InvalidState`] unless the server is running.
    pub fn ctrl(&mut self, args: &[String]) -> Result<(), LifecycleError> {
        self.expect_state("ctrl", &[ServerState::Started, ServerState::Ready])?;
        self.hooks
            .ctrl(&self.descriptor, self.pid, args)
            .map_err(|source| LifecycleError::Hook {
                server: self.descriptor.name().to_owned(),
                hook: "ctrl",
                source,
            })
    }

    /// Reports whether the server process is alive.
    ///
    /// Exited children are reaped here so they are not mistaken for live
    /// processes.
    pub fn is_running(&mut self) -> bool {
        let Some(pid) = self.pid else {
            return false;
        };
        if let Some(child) = self.child.as_mut() {
            let exited = match child.try_wait() {
                Ok(status) => status.is_some(),
                Err(error) => {
                    debug!(
                        target: CONTROLLER_TARGET,
                        server = self.descriptor.name(),
                        error = %error,
                        "child status unavailable"
                    );
                    false
                }
            };
            if child.id() == pid {
                return !exited;
            }
        }
        is_running(pid)
    }

    /// Stops the server. Never fails and is a no-op once stopped.
    ///
    /// The authoritative PID is stopped as a direct child when it is the
    /// spawned process and as a detached process otherwise; a separate
    /// launcher is then reaped.
    pub fn stop(&mut self) -> StopOutcome {
        if !matches!(self.state, ServerState::Started | ServerState::Ready) {
            return StopOutcome::NotRunning;
        }
        let _entered = self.span.clone().entered();
        let mut launcher = self.child.take();
        let launcher_pid = launcher.as_ref().map(Child::id);
        let mut outcome = StopOutcome::NotRunning;

        if let Some(pid) = self.pid {
            outcome = if launcher_pid == Some(pid) {
                launcher.take().map_or(StopOutcome::NotRunning, stop_child)
            } else {
                stop_with_signal(pid, ProcessOwnership::Detached)
            };
        }
        if let Some(child) = launcher {
            let launcher_outcome = stop_child(child);
            if self.pid.is_none() {
                outcome = launcher_outcome;
            }
        }

        self.state = ServerState::Stopped;
        info!(
            target: CONTROLLER_TARGET,
            server = self.descriptor.name(),
            pid = ?self.pid,
            ?outcome,
            "server stopped"
        );
        outcome
    }

    fn expect_state(
        &self,
        operation: &'static str,
        allowed: &[ServerState],
    ) -> Result<(), LifecycleError> {
        if allowed.contains(&self.state) {
            return Ok(());
        }
        Err(LifecycleError::InvalidState {
            server: self.descriptor.name().to_owned(),
            operation,
            state: self.state,
        })
    }

    fn diagnostic_line(&mut self, line: &str) -> Result<(), LifecycleError> {
        writeln!(self.diagnostics, "{line}")
            .and_then(|()| self.diagnostics.flush())
            .map_err(|source| LifecycleError::Diagnostics {
                server: self.descriptor.name().to_owned(),
                source,
            })
    }
}

/// Stops a spawned child unless it has already been reaped.
fn stop_child(mut child: Child) -> StopOutcome {
    match child.try_wait() {
        Ok(Some(status)) => {
            debug!(target: CONTROLLER_TARGET, pid = child.id(), %status, "child already exited");
            StopOutcome::NotRunning
        }
        Ok(None) | Err(_) => stop_with_signal(child.id(), ProcessOwnership::Child),
    }
}

impl<W: Write> Drop for ServerController<W> {
    fn drop(&mut self) {
        if matches!(self.state, ServerState::Started | ServerState::Ready) {
            debug!(
                target: CONTROLLER_TARGET,
                server = self.descriptor.name(),
                "stopping server on drop"
            );
            let _outcome = self.stop();
        }
    }
}

impl<W: Write> std::fmt::Debug for ServerController<W> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ServerController")
            .field("server", &self.descriptor.name())
            .field("state", &self.state)
            .field("pid", &self.pid)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests;
