//! CLI error handling

use om_artifact::ArtifactError;
use om_config::ConfigError;
use om_director::DirectorError;
use om_tile::TileError;
use thiserror::Error;

/// CLI error type
#[derive(Debug, Error)]
pub enum CliError {
    /// Bad or conflicting flags, unreadable input files
    #[error("{0}")]
    InvalidInput(String),

    /// The Director is in a state that forbids the operation
    #[error("{0}")]
    StateConflict(String),

    /// Something looked up by name does not exist
    #[error("{0}")]
    NotFound(String),

    /// A Director call failed during a named step
    #[error("{context}: {source}")]
    Remote {
        context: String,
        #[source]
        source: DirectorError,
    },

    #[error(transparent)]
    Director(DirectorError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Tile(#[from] TileError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    /// Interrupted before the operation finished
    #[error("cancelled; anything already started on the Director keeps running")]
    Cancelled,

    /// `--check` found differences
    #[error("there are pending changes")]
    DiffHasChanges,

    #[error("prompt failed: {0}")]
    Prompt(#[from] dialoguer::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type for CLI operations
pub type CliResult<T> = std::result::Result<T, CliError>;

impl From<DirectorError> for CliError {
    fn from(err: DirectorError) -> Self {
        if err.is_cancelled() {
            Self::Cancelled
        } else {
            Self::Director(err)
        }
    }
}

impl CliError {
    /// Prefix a Director failure with the step that was running.
    pub fn remote(context: impl Into<String>, source: DirectorError) -> Self {
        if source.is_cancelled() {
            return Self::Cancelled;
        }
        Self::Remote {
            context: context.into(),
            source,
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Process exit status for this error
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::DiffHasChanges => 2,
            _ => 1,
        }
    }
}
