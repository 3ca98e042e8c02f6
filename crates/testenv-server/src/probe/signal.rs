use std::time::Duration;

use tracing::{debug, info, warn};

use super::PROBE_TARGET;

/// Time a stopped process is given to exit after `SIGTERM`.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Relationship between the controller and the process being stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOwnership {
    /// Spawned directly by this process; must be reaped after it exits.
    Child,
    /// Discovered through a pid file; may be a grandchild and must never be
    /// waited on.
    Detached,
}

/// Result of a best-effort stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// No such process existed when the stop began.
    NotRunning,
    /// The process exited after `SIGTERM`.
    Exited,
    /// The child ignored `SIGTERM` and was killed with `SIGKILL`.
    Killed,
    /// The detached process was still visible when the timeout elapsed.
    StillRunning,
}

/// Returns `true` when a process with `pid` exists and may be signalled by
/// the caller.
#[must_use]
pub fn is_running(pid: u32) -> bool {
    imp::is_running(pid)
}

/// Stops `pid` with `SIGTERM`, waiting up to [`STOP_TIMEOUT`].
///
/// Never fails: a process that has already gone is reported as
/// [`StopOutcome::NotRunning`], and unexpected OS errors are logged.
#[must_use]
pub fn stop_with_signal(pid: u32, ownership: ProcessOwnership) -> StopOutcome {
    stop_with_signal_within(pid, ownership, STOP_TIMEOUT)
}

/// Stops `pid` like [`stop_with_signal`] with an explicit exit budget.
///
/// Children are reaped with `waitpid`; a child still alive once `timeout`
/// elapses is sent `SIGKILL` and reaped. Detached processes are only
/// signalled and then watched until they disappear or `timeout` elapses.
#[must_use]
pub fn stop_with_signal_within(
    pid: u32,
    ownership: ProcessOwnership,
    timeout: Duration,
) -> StopOutcome {
    let outcome = imp::stop(pid, ownership, timeout);
    info!(
        target: PROBE_TARGET,
        pid,
        ?ownership,
        ?outcome,
        "stop finished"
    );
    outcome
}

#[cfg(unix)]
mod imp {
    use std::thread;
    use std::time::{Duration, Instant};

    use nix::errno::Errno;
    use nix::sys::signal::{Signal, kill};
    use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
    use nix::unistd::Pid;

    use super::{ProcessOwnership, StopOutcome, debug, warn};
    use crate::probe::{PROBE_TARGET, next_pause, wait_for};

    /// Converts a PID, rejecting values that `kill(2)` would interpret as a
    /// process group or that do not fit in `pid_t`.
    fn to_pid(pid: u32) -> Option<Pid> {
        i32::try_from(pid)
            .ok()
            .filter(|raw| *raw > 0)
            .map(Pid::from_raw)
    }

    pub(super) fn is_running(pid: u32) -> bool {
        let Some(target) = to_pid(pid) else {
            return false;
        };
        match kill(target, None) {
            Ok(()) => true,
            Err(errno) => {
                debug!(
                    target: PROBE_TARGET,
                    pid,
                    %errno,
                    "process not queryable"
                );
                false
            }
        }
    }

    pub(super) fn stop(pid: u32, ownership: ProcessOwnership, timeout: Duration) -> StopOutcome {
        let Some(target) = to_pid(pid) else {
            warn!(target: PROBE_TARGET, pid, "refusing to signal invalid pid");
            return StopOutcome::NotRunning;
        };
        match kill(target, Signal::SIGTERM) {
            Ok(()) => {}
            Err(Errno::ESRCH) => return StopOutcome::NotRunning,
            Err(errno) => {
                warn!(
                    target: PROBE_TARGET,
                    pid,
                    %errno,
                    "failed to deliver SIGTERM"
                );
                return StopOutcome::NotRunning;
            }
        }
        match ownership {
            ProcessOwnership::Child => reap_child(target, timeout),
            ProcessOwnership::Detached => {
                if wait_for(|| !is_running(pid), timeout) {
                    StopOutcome::Exited
                } else {
                    warn!(
                        target: PROBE_TARGET,
                        pid,
                        timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                        "detached process still running after SIGTERM"
                    );
                    StopOutcome::StillRunning
                }
            }
        }
    }

    fn reap_child(target: Pid, timeout: Duration) -> StopOutcome {
        let deadline = Instant::now().checked_add(timeout);
        loop {
            match waitpid(target, Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) | Err(Errno::EINTR) => {}
                Ok(status) => {
                    debug!(target: PROBE_TARGET, ?status, "child reaped");
                    return StopOutcome::Exited;
                }
                Err(Errno::ECHILD) => return StopOutcome::Exited,
                Err(errno) => {
                    warn!(
                        target: PROBE_TARGET,
                        pid = target.as_raw(),
                        %errno,
                        "failed to reap child"
                    );
                    return StopOutcome::Exited;
                }
            }
            let Some(pause) = next_pause(deadline) else {
                break;
            };
            thread::sleep(pause);
        }
        warn!(
            target: PROBE_TARGET,
            pid = target.as_raw(),
            "child ignored SIGTERM; sending SIGKILL"
        );
        if let Err(errno) = kill(target, Signal::SIGKILL) {
            debug!(target: PROBE_TARGET, %errno, "SIGKILL not delivered");
        }
        loop {
            match waitpid(target, None) {
                Err(Errno::EINTR) => {}
                Ok(_) | Err(_) => return StopOutcome::Killed,
            }
        }
    }
}

#[cfg(not(unix))]
mod imp {
    use std::time::Duration;

    use super::{ProcessOwnership, StopOutcome, warn};
    use crate::probe::PROBE_TARGET;

    pub(super) fn is_running(_pid: u32) -> bool {
        false
    }

    pub(super) fn stop(pid: u32, _ownership: ProcessOwnership, _timeout: Duration) -> StopOutcome {
        warn!(
            target: PROBE_TARGET,
            pid,
            "platform does not support signalling"
        );
        StopOutcome::NotRunning
    }
}
