//! Serialisers that write a server's configuration tree to disk.
//!
//! Each writer is registered under a format tag (`ini`, `yaml`, `json`)
//! and receives the target path together with the key/value tree from the
//! server description. Callers may register additional formats before
//! descriptors are validated.

mod files;
mod formats;

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;

pub use formats::{write_ini, write_json, write_yaml};

/// Key/value tree handed to a config writer.
pub type ConfigTree = Map<String, Value>;

type WriterFn = dyn Fn(&Path, &ConfigTree) -> Result<(), ConfigWriteError> + Send + Sync;

/// Shareable handle to a config serialiser.
#[derive(Clone)]
pub struct ConfigWriter(Arc<WriterFn>);

impl ConfigWriter {
    /// Wraps a writer function.
    #[must_use]
    pub fn new<F>(writer: F) -> Self
    where
        F: Fn(&Path, &ConfigTree) -> Result<(), ConfigWriteError> + Send + Sync + 'static,
    {
        Self(Arc::new(writer))
    }

    /// Serialises `tree` to `path`.
    ///
    /// # Errors
    ///
    /// Propagates the writer's [`ConfigWriteError`].
    pub fn write(&self, path: &Path, tree: &ConfigTree) -> Result<(), ConfigWriteError> {
        (self.0)(path, tree)
    }
}

impl fmt::Debug for ConfigWriter {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("ConfigWriter(..)")
    }
}

/// Format tags mapped to their writers.
#[derive(Debug, Clone)]
pub struct EmitterRegistry {
    writers: BTreeMap<String, ConfigWriter>,
}

impl Default for EmitterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EmitterRegistry {
    /// Builds a registry holding the built-in `ini`, `yaml` and `json`
    /// writers.
    #[must_use]
    pub fn new() -> Self {
        let mut writers = BTreeMap::new();
        writers.insert(String::from("ini"), ConfigWriter::new(write_ini));
        writers.insert(String::from("yaml"), ConfigWriter::new(write_yaml));
        writers.insert(String::from("json"), ConfigWriter::new(write_json));
        Self { writers }
    }

    /// Builds a registry with no writers.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            writers: BTreeMap::new(),
        }
    }

    /// Adds a writer for `format`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::DuplicateFormat`] when the tag is already
    /// taken; the existing writer is kept.
    pub fn register(
        &mut self,
        format: impl Into<String>,
        writer: ConfigWriter,
    ) -> Result<(), RegistrationError> {
        let format = format.into();
        if self.writers.contains_key(&format) {
            return Err(RegistrationError::DuplicateFormat { format });
        }
        self.writers.insert(format, writer);
        Ok(())
    }

    /// Looks up the writer for `format`.
    #[must_use]
    pub fn get(&self, format: &str) -> Option<ConfigWriter> {
        self.writers.get(format).cloned()
    }

    /// Reports whether `format` has a writer.
    #[must_use]
    pub fn contains(&self, format: &str) -> bool {
        self.writers.contains_key(format)
    }

    /// Registered format tags in sorted order.
    pub fn formats(&self) -> impl Iterator<Item = &str> {
        self.writers.keys().map(String::as_str)
    }
}

/// Errors raised when registering a writer.
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// Another writer already owns the format tag.
    #[error("config format '{format}' is already registered")]
    DuplicateFormat {
        /// Rejected tag.
        format: String,
    },
}

/// Errors raised by config writers.
#[derive(Debug, Error)]
pub enum ConfigWriteError {
    /// Writing the file failed.
    #[error("failed to write config file '{path}': {source}")]
    Io {
        /// Target file.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The tree holds a value the format cannot represent.
    #[error("cannot write '{key}' to '{path}': {reason}")]
    Unsupported {
        /// Target file.
        path: PathBuf,
        /// Dotted key path of the offending value.
        key: String,
        /// What the format could not represent.
        reason: &'static str,
    },
    /// The serialiser rejected the tree.
    #[error("failed to serialise {format} config for '{path}': {message}")]
    Serialise {
        /// Target file.
        path: PathBuf,
        /// Format tag.
        format: &'static str,
        /// Serialiser message.
        message: String,
    },
}

#[cfg(test)]
mod tests;
