//! Variable pool assembled from environment, files and command-line overrides.

use std::path::Path;

use serde_yaml::Value;

use crate::error::{ConfigError, Result};

/// Ordered list of variable bindings. Later bindings shadow earlier ones.
#[derive(Debug, Clone, Default)]
pub struct VariablePool {
    bindings: Vec<(String, Value)>,
}

impl VariablePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a binding
    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.push((name.into(), value));
    }

    /// Bind every `PREFIX_name=value` pair in `environ`.
    ///
    /// Values are read as YAML so numbers, booleans and structures keep their
    /// type. Values that read as plain strings, or not as YAML at all, are
    /// bound verbatim, except a double-quoted integer which binds as the
    /// unquoted digits.
    pub fn extend_from_env<I, K, V>(&mut self, prefix: &str, environ: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let prefix = format!("{}_", prefix);
        for (key, raw) in environ {
            let key = key.as_ref();
            let raw = raw.as_ref();
            let Some(name) = key.strip_prefix(&prefix) else {
                continue;
            };

            let value = match serde_yaml::from_str::<Value>(raw) {
                Ok(Value::String(_)) | Err(_) => Value::String(env_string(raw)),
                Ok(other) => other,
            };
            tracing::debug!(variable = name, "bound variable from environment");
            self.bind(name, value);
        }
    }

    /// Bind every top-level entry of a YAML variables file.
    pub fn extend_from_file(&mut self, path: &Path) -> Result<()> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        self.extend_from_yaml(&path.display().to_string(), &contents)
    }

    /// Bind every top-level entry of a YAML mapping.
    pub fn extend_from_yaml(&mut self, origin: &str, contents: &str) -> Result<()> {
        let doc: Value = serde_yaml::from_str(contents).map_err(|e| ConfigError::parse(origin, e))?;
        match doc {
            Value::Null => Ok(()),
            Value::Mapping(mapping) => {
                for (key, value) in mapping {
                    let name = match key {
                        Value::String(s) => s,
                        other => crate::placeholder::stringify(&other),
                    };
                    self.bind(name, value);
                }
                Ok(())
            }
            _ => Err(ConfigError::parse(origin, "expected a mapping of variables")),
        }
    }

    /// Bind `NAME=VALUE` assignments, coercing to integer, then boolean,
    /// then string.
    pub fn extend_from_assignments<I, S>(&mut self, assignments: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for assignment in assignments {
            let assignment = assignment.as_ref();
            let (name, raw) = assignment
                .split_once('=')
                .ok_or_else(|| ConfigError::InvalidVariable(assignment.to_string()))?;
            self.bind(name, coerce(raw));
        }
        Ok(())
    }

    /// The last binding for `name`
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Look up `name`, falling back to descending through `.`-separated
    /// segments when there is no exact binding.
    pub fn resolve(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.get(name) {
            return Some(value.clone());
        }
        let mut segments = name.split('.');
        let head = segments.next()?;
        let mut current = self.get(head)?;
        let mut descended = false;
        for segment in segments {
            current = match current {
                Value::Mapping(mapping) => mapping.get(segment)?,
                Value::Sequence(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
            descended = true;
        }
        descended.then(|| current.clone())
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

fn env_string(raw: &str) -> String {
    let quoted_digits = raw.len() > 2
        && raw.starts_with('"')
        && raw.ends_with('"')
        && raw[1..raw.len() - 1].bytes().all(|b| b.is_ascii_digit());
    if quoted_digits {
        raw[1..raw.len() - 1].to_string()
    } else {
        raw.to_string()
    }
}

fn coerce(raw: &str) -> Value {
    if let Ok(n) = raw.parse::<i64>() {
        return Value::from(n);
    }
    match raw {
        "t" | "T" | "TRUE" | "true" | "True" => Value::Bool(true),
        "f" | "F" | "FALSE" | "false" | "False" => Value::Bool(false),
        _ => Value::String(raw.to_string()),
    }
}
