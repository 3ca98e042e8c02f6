use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use super::fields::RawFields;
use super::{ConfigError, ConfigSpec, DescriptorContext, ServerDescriptor, ServerKind};
use crate::emitter::ConfigTree;
use crate::probe::{SocketEndpoint, find_executable_in};

const DESCRIPTOR_TARGET: &str = "testenv_server::descriptor";

const KIND: &[&str] = &["kind"];
const COMMAND: &[&str] = &["command"];
const CONFIG: &[&str] = &["config"];
const CONFIG_FORMAT: &[&str] = &["config_format", "configFormat", "configtype"];
const CONFIG_FILE: &[&str] = &["config_file", "configFile", "configfile"];
const STDOUT: &[&str] = &["stdout"];
const STDERR: &[&str] = &["stderr"];
const PIDFILE: &[&str] = &["pidfile"];
const ENVIRON: &[&str] = &["environ"];
const CLEAR_ENVIRON: &[&str] = &["clear_environ", "clearEnviron"];
const START_TIMEOUT: &[&str] = &["start_timeout", "startTimeout"];
const ADDRESS: &[&str] = &["address"];
const AFTER: &[&str] = &["after"];

impl ServerDescriptor {
    /// Validates one server entry.
    ///
    /// Recognised keys are checked and converted; anything else is kept in
    /// [`ServerDescriptor::extra`]. The command's program is resolved to an
    /// absolute executable here so a missing binary is reported before any
    /// server in the batch starts.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] naming the server and the offending field.
    pub fn from_raw(
        name: &str,
        raw: ConfigTree,
        context: &DescriptorContext,
    ) -> Result<Self, ConfigError> {
        validate_name(name)?;
        let basedir = context.run_dir().join(name);
        let mut fields = RawFields::new(name, raw);

        let kind = match fields.take_string(KIND)? {
            None => ServerKind::default(),
            Some(kind) => kind.parse::<ServerKind>().map_err(|_| ConfigError::UnknownKind {
                server: name.to_owned(),
                kind,
            })?,
        };
        let (program, args) = command(&mut fields, context)?;
        let config = config(&mut fields, kind, &basedir, context)?;

        let default_log = matches!(kind, ServerKind::Generic).then(|| format!("{name}.log"));
        let stdout = fields
            .take_string(STDOUT)?
            .or_else(|| default_log.clone())
            .map(|path| basedir.join(path));
        let stderr = fields
            .take_string(STDERR)?
            .or(default_log)
            .map(|path| basedir.join(path));
        let pidfile = fields.take_string(PIDFILE)?.map(|path| basedir.join(path));
        let environ = environ(&mut fields)?;
        let clear_environ = fields.take_bool(CLEAR_ENVIRON)?.unwrap_or(false);
        let default_timeout = context.default_start_timeout();
        let start_timeout = fields
            .take_seconds(START_TIMEOUT)?
            .map_or(default_timeout, Duration::from_secs);
        let address = match fields.take_string(ADDRESS)? {
            None => None,
            Some(address) => Some(address.parse::<SocketEndpoint>().map_err(|source| {
                ConfigError::InvalidAddress {
                    server: name.to_owned(),
                    address,
                    source,
                }
            })?),
        };
        let after = fields.take_string_list(AFTER)?;
        let extra = fields.into_extra();

        let descriptor = Self {
            name: name.to_owned(),
            kind,
            basedir,
            program,
            args,
            config,
            stdout,
            stderr,
            environ,
            clear_environ,
            pidfile,
            address,
            start_timeout,
            after,
            extra,
        };
        debug!(
            target: DESCRIPTOR_TARGET,
            server = name,
            kind = %kind,
            command = %descriptor.command_line(),
            after = ?descriptor.after,
            "server description validated"
        );
        Ok(descriptor)
    }

    /// Validates one server entry given as an arbitrary JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotAMapping`] for anything but an object, and
    /// otherwise behaves like [`ServerDescriptor::from_raw`].
    pub fn from_value(
        name: &str,
        raw: Value,
        context: &DescriptorContext,
    ) -> Result<Self, ConfigError> {
        match raw {
            Value::Object(map) => Self::from_raw(name, map, context),
            _ => Err(ConfigError::NotAMapping {
                server: name.to_owned(),
            }),
        }
    }
}

fn validate_name(name: &str) -> Result<(), ConfigError> {
    let invalid = |reason| ConfigError::InvalidName {
        name: name.to_owned(),
        reason,
    };
    if name.is_empty() {
        return Err(invalid("name is empty"));
    }
    if name.contains('\0') {
        return Err(invalid("name contains a NUL byte"));
    }
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(part)), None) if part == name => Ok(()),
        _ => Err(invalid("name must be a single directory component")),
    }
}

fn command(
    fields: &mut RawFields<'_>,
    context: &DescriptorContext,
) -> Result<(PathBuf, Vec<String>), ConfigError> {
    let server = fields.server().to_owned();
    let argv = match fields.take(COMMAND)? {
        None => {
            return Err(ConfigError::MissingField {
                server,
                field: "command",
            });
        }
        Some(Value::String(line)) => {
            shlex::split(&line).ok_or_else(|| ConfigError::InvalidCommand {
                server: server.clone(),
                command: line,
            })?
        }
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::String(arg) => Ok(arg),
                _ => Err(fields.invalid("command", "a string or an array of strings")),
            })
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => return Err(fields.invalid("command", "a string or an array of strings")),
    };
    let mut argv = argv.into_iter();
    let Some(program) = argv.next() else {
        return Err(ConfigError::EmptyCommand { server });
    };
    let resolved = find_executable_in(
        &program,
        context.conf_dir(),
        context.search_path().map(|path| path.as_os_str()),
    )
    .ok_or_else(|| ConfigError::ExecutableNotFound {
        server,
        program,
        search_dir: context.conf_dir().to_path_buf(),
    })?;
    Ok((resolved, argv.collect()))
}

fn config(
    fields: &mut RawFields<'_>,
    kind: ServerKind,
    basedir: &Path,
    context: &DescriptorContext,
) -> Result<Option<ConfigSpec>, ConfigError> {
    let tree = fields.take_mapping(CONFIG)?;
    let format = fields.take_string(CONFIG_FORMAT)?;
    let file = fields.take_string(CONFIG_FILE)?;
    let Some(tree) = tree else {
        if format.is_some() || file.is_some() {
            debug!(
                target: DESCRIPTOR_TARGET,
                server = fields.server(),
                "config format or file given without config; ignoring"
            );
        }
        return Ok(None);
    };
    let server = fields.server().to_owned();
    if kind != ServerKind::Generic {
        return Err(ConfigError::ConfigNotSupported { server, kind });
    }
    let file = file.ok_or_else(|| ConfigError::MissingField {
        server: server.clone(),
        field: "config_file",
    })?;
    let format = format.ok_or_else(|| ConfigError::MissingField {
        server: server.clone(),
        field: "config_format",
    })?;
    let writer = context
        .emitters()
        .get(&format)
        .ok_or_else(|| ConfigError::UnsupportedConfigFormat {
            server,
            format: format.clone(),
        })?;
    Ok(Some(ConfigSpec {
        format,
        file: basedir.join(file),
        tree,
        writer,
    }))
}

/// Reads `environ`, stringifying scalar values.
fn environ(fields: &mut RawFields<'_>) -> Result<BTreeMap<String, String>, ConfigError> {
    let Some(entries) = fields.take_mapping(ENVIRON)? else {
        return Ok(BTreeMap::new());
    };
    entries
        .into_iter()
        .map(|(key, value)| {
            let text = match value {
                Value::String(text) => text,
                Value::Number(number) => number.to_string(),
                Value::Bool(flag) => flag.to_string(),
                _ => {
                    return Err(
                        fields.invalid(format!("environ.{key}"), "a string, number or boolean")
                    );
                }
            };
            if key.is_empty() || key.contains(['=', '\0']) || text.contains('\0') {
                return Err(fields.invalid(
                    format!("environ.{key}"),
                    "a variable name without '=' or NUL bytes",
                ));
            }
            Ok((key, text))
        })
        .collect()
}
