//! Alias-aware extraction of fields from a raw server mapping.

use serde_json::Value;

use super::ConfigError;
use crate::emitter::ConfigTree;

/// Raw server mapping that fields are removed from as they are validated.
///
/// Whatever is left once validation finishes becomes the descriptor's
/// `extra` bag. `null` values count as absent.
pub(super) struct RawFields<'a> {
    server: &'a str,
    entries: ConfigTree,
}

impl<'a> RawFields<'a> {
    pub(super) const fn new(server: &'a str, entries: ConfigTree) -> Self {
        Self { server, entries }
    }

    /// Removes the field stored under any of `aliases`.
    ///
    /// The first alias is the canonical name used in errors.
    pub(super) fn take(&mut self, aliases: &[&'static str]) -> Result<Option<Value>, ConfigError> {
        let mut found: Option<(&'static str, Value)> = None;
        for &alias in aliases {
            let Some(value) = self.entries.remove(alias) else {
                continue;
            };
            if let Some((first, _)) = found {
                return Err(ConfigError::ConflictingFields {
                    server: self.server.to_owned(),
                    first,
                    second: alias,
                });
            }
            found = Some((alias, value));
        }
        Ok(found
            .map(|(_, value)| value)
            .filter(|value| !value.is_null()))
    }

    pub(super) fn take_string(
        &mut self,
        aliases: &[&'static str],
    ) -> Result<Option<String>, ConfigError> {
        match self.take(aliases)? {
            None => Ok(None),
            Some(Value::String(text)) => Ok(Some(text)),
            Some(_) => Err(self.invalid(canonical(aliases), "a string")),
        }
    }

    pub(super) fn take_bool(&mut self, aliases: &[&'static str]) -> Result<Option<bool>, ConfigError> {
        match self.take(aliases)? {
            None => Ok(None),
            Some(Value::Bool(flag)) => Ok(Some(flag)),
            Some(_) => Err(self.invalid(canonical(aliases), "a boolean")),
        }
    }

    pub(super) fn take_seconds(
        &mut self,
        aliases: &[&'static str],
    ) -> Result<Option<u64>, ConfigError> {
        match self.take(aliases)? {
            None => Ok(None),
            Some(value) => value.as_u64().map(Some).ok_or_else(|| {
                self.invalid(
                    canonical(aliases),
                    "a non-negative whole number of seconds",
                )
            }),
        }
    }

    pub(super) fn take_mapping(
        &mut self,
        aliases: &[&'static str],
    ) -> Result<Option<ConfigTree>, ConfigError> {
        match self.take(aliases)? {
            None => Ok(None),
            Some(Value::Object(map)) => Ok(Some(map)),
            Some(_) => Err(self.invalid(canonical(aliases), "a mapping")),
        }
    }

    /// Accepts a single string or a list of strings.
    pub(super) fn take_string_list(
        &mut self,
        aliases: &[&'static str],
    ) -> Result<Vec<String>, ConfigError> {
        let expected = "a string or a list of strings";
        match self.take(aliases)? {
            None => Ok(Vec::new()),
            Some(Value::String(text)) => Ok(vec![text]),
            Some(Value::Array(items)) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(text) => Ok(text),
                    _ => Err(self.invalid(canonical(aliases), expected)),
                })
                .collect(),
            Some(_) => Err(self.invalid(canonical(aliases), expected)),
        }
    }

    pub(super) fn invalid(&self, field: impl Into<String>, expected: &'static str) -> ConfigError {
        ConfigError::InvalidField {
            server: self.server.to_owned(),
            field: field.into(),
            expected,
        }
    }

    pub(super) fn server(&self) -> &str {
        self.server
    }

    pub(super) fn into_extra(self) -> ConfigTree {
        self.entries
    }
}

fn canonical(aliases: &[&'static str]) -> &'static str {
    aliases.first().copied().unwrap_or("option")
}
