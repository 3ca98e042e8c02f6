use std::env;
use std::ffi::OsStr;
use std::fs;
use std::path::{self, Path, PathBuf};

use tracing::debug;

use super::PROBE_TARGET;

/// Resolves `name` to an absolute executable path.
///
/// Names containing a path separator are resolved against `search_dir`
/// (absolute names are used as they are); bare names are looked up on the
/// `PATH` of the current process.
#[must_use]
pub fn find_executable(name: &str, search_dir: &Path) -> Option<PathBuf> {
    find_executable_in(name, search_dir, env::var_os("PATH").as_deref())
}

/// Resolves `name` like [`find_executable`] using an explicit search path.
#[must_use]
pub fn find_executable_in(
    name: &str,
    search_dir: &Path,
    search_path: Option<&OsStr>,
) -> Option<PathBuf> {
    if name.is_empty() {
        return None;
    }
    let resolved = if has_separator(name) {
        let candidate = search_dir.join(name);
        is_executable(&candidate).then_some(candidate)
    } else {
        search_path.and_then(|paths| {
            env::split_paths(paths)
                .filter(|dir| !dir.as_os_str().is_empty())
                .map(|dir| dir.join(name))
                .find(|candidate| is_executable(candidate))
        })
    };
    debug!(
        target: PROBE_TARGET,
        program = name,
        resolved = ?resolved,
        "executable lookup"
    );
    resolved.map(absolutise)
}

fn has_separator(name: &str) -> bool {
    name.contains('/') || name.contains(path::MAIN_SEPARATOR)
}

fn absolutise(candidate: PathBuf) -> PathBuf {
    path::absolute(&candidate).unwrap_or(candidate)
}

#[cfg(unix)]
fn is_executable(candidate: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(candidate)
        .is_ok_and(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(candidate: &Path) -> bool {
    fs::metadata(candidate).is_ok_and(|meta| meta.is_file())
}
