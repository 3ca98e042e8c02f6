//! Low-level operating system queries used by the lifecycle controller.
//!
//! Every waiting helper here is a bounded busy-wait: it polls at
//! [`POLL_INTERVAL`], never sleeps past its deadline, and reports exhaustion
//! through its return value rather than an error. Stop-path failures are
//! logged and swallowed so batch teardown always runs to completion.

mod executable;
mod pid;
mod signal;
mod socket;

use std::thread;
use std::time::{Duration, Instant};

pub use executable::{find_executable, find_executable_in};
pub use pid::{read_pid, wait_for_pid};
pub use signal::{
    ProcessOwnership, STOP_TIMEOUT, StopOutcome, is_running, stop_with_signal,
    stop_with_signal_within,
};
pub use socket::{SocketEndpoint, SocketParseError, socket_is_reachable, wait_for_socket};

/// Tracing target for probe operations.
pub(crate) const PROBE_TARGET: &str = "testenv_server::probe";

/// Interval between attempts in every polling loop.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Polls `predicate` until it returns `true` or `max` elapses.
///
/// The predicate is always evaluated at least once, so a zero `max` performs
/// exactly one check. Sleeps are clamped to the remaining budget, which keeps
/// the total wait within `max` plus the cost of the final evaluation. A
/// budget too large to represent as an [`Instant`] never expires.
#[must_use]
pub fn wait_for<P>(mut predicate: P, max: Duration) -> bool
where
    P: FnMut() -> bool,
{
    let deadline = Instant::now().checked_add(max);
    loop {
        if predicate() {
            return true;
        }
        let Some(pause) = next_pause(deadline) else {
            return false;
        };
        thread::sleep(pause);
    }
}

/// Time to sleep before the next attempt, or `None` once `deadline` has
/// passed. `None` as the deadline means unbounded.
pub(crate) fn next_pause(deadline: Option<Instant>) -> Option<Duration> {
    let Some(deadline) = deadline else {
        return Some(POLL_INTERVAL);
    };
    deadline
        .checked_duration_since(Instant::now())
        .filter(|remaining| !remaining.is_zero())
        .map(|remaining| POLL_INTERVAL.min(remaining))
}
