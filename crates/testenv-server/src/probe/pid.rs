use std::fs;
use std::path::Path;
use std::time::Duration;

use tracing::debug;

use super::{PROBE_TARGET, wait_for};

/// Reads a PID file, returning `None` while it is missing, empty, or not yet
/// a complete integer.
#[must_use]
pub fn read_pid(path: &Path) -> Option<u32> {
    let content = fs::read_to_string(path).ok()?;
    content.trim().parse::<u32>().ok().filter(|pid| *pid != 0)
}

/// Polls `path` until it holds a PID or `max` elapses.
///
/// Servers often create the file before flushing its contents, so empty and
/// partial reads are retried rather than reported.
#[must_use]
pub fn wait_for_pid(path: &Path, max: Duration) -> Option<u32> {
    let mut pid = None;
    let found = wait_for(
        || {
            pid = read_pid(path);
            pid.is_some()
        },
        max,
    );
    debug!(
        target: PROBE_TARGET,
        file = %path.display(),
        found,
        pid = ?pid,
        timeout_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX),
        "pid file poll finished"
    );
    pid
}
