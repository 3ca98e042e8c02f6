use std::io::{self, Write};
use std::path::Path;

use tempfile::Builder;

use super::ConfigWriteError;

/// Writes `contents` to `path` through a temporary sibling that is synced
/// and renamed into place, so a server never reads a half-written config.
pub(super) fn atomic_write(path: &Path, contents: &[u8]) -> Result<(), ConfigWriteError> {
    write_through_temp(path, contents).map_err(|source| ConfigWriteError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn write_through_temp(path: &Path, contents: &[u8]) -> io::Result<()> {
    let directory = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let prefix = path
        .file_name()
        .and_then(|name| name.to_str())
        .map_or_else(|| String::from(".config"), |name| format!(".{name}"));

    let mut file = Builder::new()
        .prefix(&prefix)
        .suffix(".tmp")
        .tempfile_in(directory)?;
    file.write_all(contents)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|error| error.error)?;
    Ok(())
}
