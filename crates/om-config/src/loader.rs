//! The configuration merger: base document, variable pool and overlays.

use std::path::{Path, PathBuf};

use serde_yaml::Value;

use crate::error::{ConfigError, Result};
use crate::overlay::{self, Overlay, Pointer};
use crate::placeholder::Substitution;
use crate::section::ConfigTree;
use crate::vars::VariablePool;

/// What to do with placeholders that have no binding
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MissingPolicy {
    /// Fail with every missing name
    #[default]
    Strict,
    /// Leave `((name))` in place
    Skip,
}

/// Inputs layered over a base document
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// YAML variable files, lowest precedence first
    pub var_files: Vec<PathBuf>,
    /// `NAME=VALUE` overrides, highest precedence
    pub vars: Vec<String>,
    /// Environment prefixes; `P` binds every `P_name=value`
    pub var_env_prefixes: Vec<String>,
    /// Overlay files applied in order after substitution
    pub ops_files: Vec<PathBuf>,
    pub missing: MissingPolicy,
    /// Optional path expression selecting part of the result
    pub path: Option<String>,
}

impl LoadOptions {
    pub fn with_var_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.var_env_prefixes.push(prefix.into());
        self
    }
}

/// Produces a final configuration document from a base file plus
/// variables and overlays.
#[derive(Debug, Clone)]
pub struct Merger {
    options: LoadOptions,
    environ: Vec<(String, String)>,
}

impl Merger {
    /// Create a merger reading variables from the process environment.
    pub fn new(options: LoadOptions) -> Self {
        let environ = std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect();
        Self { options, environ }
    }

    /// Replace the environment used for prefixed variables.
    pub fn with_environ<I, K, V>(mut self, environ: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.environ = environ
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    pub fn options(&self) -> &LoadOptions {
        &self.options
    }

    /// Assemble the variable pool: environment, then files, then overrides.
    pub fn pool(&self) -> Result<VariablePool> {
        let mut pool = VariablePool::new();
        for prefix in &self.options.var_env_prefixes {
            pool.extend_from_env(prefix, self.environ.iter().map(|(k, v)| (k, v)));
        }
        for path in &self.options.var_files {
            pool.extend_from_file(path)?;
        }
        pool.extend_from_assignments(&self.options.vars)?;
        tracing::debug!(bindings = pool.len(), "assembled variable pool");
        Ok(pool)
    }

    /// Load and merge the document at `path`.
    pub fn load(&self, path: &Path) -> Result<Value> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        self.load_str(&path.display().to_string(), &contents)
    }

    /// Merge an in-memory document.
    pub fn load_str(&self, origin: &str, contents: &str) -> Result<Value> {
        let doc: Value =
            serde_yaml::from_str(contents).map_err(|e| ConfigError::parse(origin, e))?;
        let overlays = self
            .options
            .ops_files
            .iter()
            .map(|path| Overlay::from_file(path))
            .collect::<Result<Vec<_>>>()?;

        let pool = self.pool()?;
        let mut substitution = Substitution::new(&pool);
        let mut doc = substitution.apply(doc);
        let overlays: Vec<_> = overlays
            .into_iter()
            .map(|overlay| overlay.substitute(&mut substitution))
            .collect();

        if let Some(key) = substitution.collisions().first() {
            return Err(ConfigError::DuplicateKey {
                origin: origin.to_string(),
                key: key.clone(),
            });
        }

        let missing = substitution.into_missing();
        if !missing.is_empty() {
            match self.options.missing {
                MissingPolicy::Strict => return Err(ConfigError::MissingVariables { names: missing }),
                MissingPolicy::Skip => {
                    tracing::debug!(?missing, "leaving unresolved placeholders in place")
                }
            }
        }

        for overlay in &overlays {
            overlay.apply(&mut doc)?;
        }

        match self.options.path.as_deref() {
            Some(path) => select(&doc, path),
            None => Ok(doc),
        }
    }

    /// Load and split into sections.
    pub fn load_tree(&self, path: &Path) -> Result<ConfigTree> {
        ConfigTree::from_value(self.load(path)?)
    }
}

/// Resolve a path expression against a merged document.
pub fn select(doc: &Value, path: &str) -> Result<Value> {
    let pointer = Pointer::parse(path)?;
    if pointer.is_root() {
        return Ok(doc.clone());
    }
    overlay::select(doc, &pointer).map_err(|reason| ConfigError::PathNotFound {
        path: path.to_string(),
        reason,
    })
}

/// Serialize a document in canonical YAML form.
pub fn render(doc: &Value) -> Result<String> {
    Ok(serde_yaml::to_string(doc)?)
}

/// Serialize a selection: scalars are emitted as their exact text, anything
/// else as YAML.
pub fn render_selection(value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => render(other),
    }
}
