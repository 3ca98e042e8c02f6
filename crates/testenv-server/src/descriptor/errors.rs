use std::path::PathBuf;

use thiserror::Error;

use crate::probe::SocketParseError;

/// Errors raised while validating a server description.
///
/// Every variant names the server and, where one is at fault, the field.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The server name cannot be used as a directory name.
    #[error("invalid server name '{name}': {reason}")]
    InvalidName {
        /// Rejected name.
        name: String,
        /// Why the name was rejected.
        reason: &'static str,
    },
    /// The server entry was not a mapping.
    #[error("server {server}: description must be a mapping")]
    NotAMapping {
        /// Server name.
        server: String,
    },
    /// A required field was absent.
    #[error("server {server}: {field} option missed")]
    MissingField {
        /// Server name.
        server: String,
        /// Canonical field name.
        field: &'static str,
    },
    /// A field held a value of the wrong shape.
    #[error("server {server}: {field} option should be {expected}")]
    InvalidField {
        /// Server name.
        server: String,
        /// Field name, dotted for nested entries.
        field: String,
        /// Description of the accepted shape.
        expected: &'static str,
    },
    /// Two spellings of the same field were both given.
    #[error("server {server}: {first} and {second} set the same option")]
    ConflictingFields {
        /// Server name.
        server: String,
        /// First spelling found.
        first: &'static str,
        /// Second spelling found.
        second: &'static str,
    },
    /// The command string could not be split into arguments.
    #[error("server {server}: command '{command}' has unbalanced quoting")]
    InvalidCommand {
        /// Server name.
        server: String,
        /// Rejected command string.
        command: String,
    },
    /// The command had no program.
    #[error("server {server}: command is empty")]
    EmptyCommand {
        /// Server name.
        server: String,
    },
    /// The program could not be resolved to an executable file.
    #[error("server {server}: can't find executable for {program} (searched from '{search_dir}')")]
    ExecutableNotFound {
        /// Server name.
        server: String,
        /// Program as written in the command.
        program: String,
        /// Directory relative programs were resolved against.
        search_dir: PathBuf,
    },
    /// No writer is registered for the config format.
    #[error("server {server}: config format {format} is not supported")]
    UnsupportedConfigFormat {
        /// Server name.
        server: String,
        /// Rejected format tag.
        format: String,
    },
    /// The server variant does not emit config files.
    #[error("server {server}: {kind} servers do not accept a config option")]
    ConfigNotSupported {
        /// Server name.
        server: String,
        /// Server variant.
        kind: super::ServerKind,
    },
    /// The readiness address did not parse.
    #[error("server {server}: invalid address '{address}': {source}")]
    InvalidAddress {
        /// Server name.
        server: String,
        /// Rejected address.
        address: String,
        /// Parse failure.
        #[source]
        source: SocketParseError,
    },
    /// The server variant is not known.
    #[error("server {server}: unknown kind '{kind}'")]
    UnknownKind {
        /// Server name.
        server: String,
        /// Rejected variant name.
        kind: String,
    },
}
