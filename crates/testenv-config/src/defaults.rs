use camino::Utf8PathBuf;
use std::env;

#[cfg(unix)]
use libc::geteuid;

#[cfg(unix)]
use dirs::runtime_dir;

use crate::logging::LogFormat;

/// Seconds a server may take to publish its pid file and become ready.
pub const DEFAULT_START_TIMEOUT_SECS: u64 = 5;

/// Default log filter expression.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Directory name appended to the runtime or temporary directory.
const BASE_DIR_NAME: &str = "testenv";

/// Default log filter expression.
#[must_use]
pub fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format.
#[must_use]
pub fn default_log_format() -> LogFormat {
    LogFormat::Compact
}

/// Default server start timeout in seconds.
#[must_use]
pub const fn default_start_timeout_secs() -> u64 {
    DEFAULT_START_TIMEOUT_SECS
}

/// Directory used to resolve relative server commands when none is configured.
#[must_use]
pub fn default_conf_dir() -> Utf8PathBuf {
    env::current_dir()
        .ok()
        .and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
        .unwrap_or_else(|| Utf8PathBuf::from("."))
}

/// Computes the directory under which per-run directories are created.
#[must_use]
pub fn default_base_dir() -> Utf8PathBuf {
    default_base_dir_inner()
}

#[cfg(unix)]
fn default_base_dir_inner() -> Utf8PathBuf {
    let (mut base, apply_namespace) = match runtime_base_directory() {
        Some(dir) => (dir, false),
        None => (fallback_base_directory(), true),
    };

    base.push(BASE_DIR_NAME);
    if apply_namespace {
        base.push(user_namespace());
    }
    base
}

#[cfg(unix)]
fn runtime_base_directory() -> Option<Utf8PathBuf> {
    runtime_dir().and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
}

#[cfg(unix)]
fn fallback_base_directory() -> Utf8PathBuf {
    let candidate = env::temp_dir();
    Utf8PathBuf::from_path_buf(candidate).unwrap_or_else(|_| Utf8PathBuf::from("/tmp"))
}

#[cfg(unix)]
fn user_namespace() -> String {
    // SAFETY: geteuid(2) has no preconditions and cannot fail.
    let uid = unsafe { geteuid() };
    format!("uid-{uid}")
}

#[cfg(not(unix))]
fn default_base_dir_inner() -> Utf8PathBuf {
    let candidate = env::temp_dir();
    let mut base =
        Utf8PathBuf::from_path_buf(candidate).unwrap_or_else(|_| Utf8PathBuf::from("."));
    base.push(BASE_DIR_NAME);
    base
}
