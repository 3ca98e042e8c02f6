//! Environment composition for spawned servers.

use std::collections::BTreeMap;
use std::ffi::OsString;

/// Builds the environment for a spawned server.
///
/// `overrides` are layered over `parent`, or over nothing when `clear` is
/// set. The current process environment is never modified.
#[must_use]
pub fn compose_environment<I, K, V>(
    parent: I,
    overrides: &BTreeMap<String, String>,
    clear: bool,
) -> BTreeMap<OsString, OsString>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<OsString>,
    V: Into<OsString>,
{
    let mut environment: BTreeMap<OsString, OsString> = if clear {
        BTreeMap::new()
    } else {
        parent
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect()
    };
    for (key, value) in overrides {
        environment.insert(OsString::from(key), OsString::from(value));
    }
    environment
}
