use std::path::Path;

use serde_json::Value;

use super::files::atomic_write;
use super::{ConfigTree, ConfigWriteError};

/// Writes `tree` as INI.
///
/// Top-level scalars come first with no section header; each top-level
/// mapping becomes a `[section]` of scalar `key = value` lines.
///
/// # Errors
///
/// Returns [`ConfigWriteError::Unsupported`] for nulls, arrays and mappings
/// nested inside a section, and [`ConfigWriteError::Io`] when the file
/// cannot be written.
pub fn write_ini(path: &Path, tree: &ConfigTree) -> Result<(), ConfigWriteError> {
    let rendered = render_ini(path, tree)?;
    atomic_write(path, rendered.as_bytes())
}

/// Writes `tree` as YAML.
///
/// # Errors
///
/// Returns [`ConfigWriteError::Serialise`] when the serialiser fails and
/// [`ConfigWriteError::Io`] when the file cannot be written.
pub fn write_yaml(path: &Path, tree: &ConfigTree) -> Result<(), ConfigWriteError> {
    let rendered = serde_saphyr::to_string(tree).map_err(|error| ConfigWriteError::Serialise {
        path: path.to_path_buf(),
        format: "yaml",
        message: error.to_string(),
    })?;
    atomic_write(path, rendered.as_bytes())
}

/// Writes `tree` as pretty-printed JSON followed by a newline.
///
/// # Errors
///
/// Returns [`ConfigWriteError::Serialise`] when the serialiser fails and
/// [`ConfigWriteError::Io`] when the file cannot be written.
pub fn write_json(path: &Path, tree: &ConfigTree) -> Result<(), ConfigWriteError> {
    let mut rendered =
        serde_json::to_string_pretty(tree).map_err(|error| ConfigWriteError::Serialise {
            path: path.to_path_buf(),
            format: "json",
            message: error.to_string(),
        })?;
    rendered.push('\n');
    atomic_write(path, rendered.as_bytes())
}

pub(super) fn render_ini(path: &Path, tree: &ConfigTree) -> Result<String, ConfigWriteError> {
    let mut out = String::new();
    for (key, value) in tree {
        if value.is_object() {
            continue;
        }
        push_entry(&mut out, path, key, key, value)?;
    }
    for (section, value) in tree {
        let Value::Object(entries) = value else {
            continue;
        };
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&format!("[{section}]\n"));
        for (key, entry) in entries {
            push_entry(&mut out, path, &format!("{section}.{key}"), key, entry)?;
        }
    }
    Ok(out)
}

fn push_entry(
    out: &mut String,
    path: &Path,
    key_path: &str,
    key: &str,
    value: &Value,
) -> Result<(), ConfigWriteError> {
    let unsupported = |reason| ConfigWriteError::Unsupported {
        path: path.to_path_buf(),
        key: key_path.to_owned(),
        reason,
    };
    let text = match value {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Null => return Err(unsupported("INI has no null value")),
        Value::Array(_) => return Err(unsupported("INI has no list value")),
        Value::Object(_) => return Err(unsupported("INI sections cannot nest")),
    };
    if text.contains('\n') {
        return Err(unsupported("INI values must fit on one line"));
    }
    out.push_str(&format!("{key} = {text}\n"));
    Ok(())
}
