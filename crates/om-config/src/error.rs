//! Error types for configuration loading

use std::path::PathBuf;
use thiserror::Error;

/// Configuration error type
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file could not be read
    #[error("could not read file ({}): {source}", .path.display())]
    Read {
        /// Path that failed
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// A document was not valid YAML or had the wrong shape
    #[error("could not parse {origin}: {message}")]
    Parse {
        /// Where the document came from (file path, env var, ...)
        origin: String,
        /// Parser message
        message: String,
    },

    /// Placeholders left unresolved in strict mode
    #[error("Expected to find variables: {}", .names.join(", "))]
    MissingVariables {
        /// Every unresolved name, once, in first-seen order
        names: Vec<String>,
    },

    /// Substitution turned a mapping key into one the mapping already has
    #[error("substituting placeholders in {origin} produced the duplicate key {key:?}")]
    DuplicateKey {
        /// Where the document came from
        origin: String,
        /// The shared key
        key: String,
    },

    /// A `--var` assignment without `=`
    #[error("invalid variable {0:?}: expected NAME=VALUE")]
    InvalidVariable(String),

    /// A path expression that cannot be parsed
    #[error("cannot parse path {path:?}: {reason}")]
    InvalidPath {
        /// Raw path expression
        path: String,
        /// Why it was rejected
        reason: String,
    },

    /// An overlay entry that is not a valid operation
    #[error("invalid operation #{index} in {origin}: {reason}")]
    InvalidOperation {
        /// Overlay origin
        origin: String,
        /// Zero-based position in the overlay
        index: usize,
        /// Why it was rejected
        reason: String,
    },

    /// An overlay operation that did not apply
    #[error("operation #{index} ({kind} {path}) in {origin} failed: {reason}")]
    OperationFailed {
        /// Overlay origin
        origin: String,
        /// Zero-based position in the overlay
        index: usize,
        /// Operation type
        kind: &'static str,
        /// Path expression of the operation
        path: String,
        /// Why it failed
        reason: String,
    },

    /// A `--path` selection that does not exist
    #[error("Expected to find path {path}: {reason}")]
    PathNotFound {
        /// Raw path expression
        path: String,
        /// Why the lookup failed
        reason: String,
    },

    /// Serialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

impl ConfigError {
    pub(crate) fn parse(origin: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Parse {
            origin: origin.into(),
            message: err.to_string(),
        }
    }
}
