//! Error types for the Director gateway

use thiserror::Error;

/// Director error type
#[derive(Debug, Error)]
pub enum DirectorError {
    /// Target URL that cannot be used
    #[error("invalid target {target:?}: {reason}")]
    InvalidTarget {
        /// Target as given
        target: String,
        /// Why it was rejected
        reason: String,
    },

    /// HTTP client could not be built
    #[error("could not build http client: {0}")]
    Client(String),

    /// Transport failure
    #[error("could not send api request to {method} {path}: {source}")]
    Http {
        /// HTTP method
        method: String,
        /// Request path
        path: String,
        /// Underlying error
        #[source]
        source: reqwest::Error,
    },

    /// Non-success response
    #[error("request failed: unexpected response from {method} {path} ({status}):\n{body}")]
    Api {
        /// HTTP method
        method: String,
        /// Request path
        path: String,
        /// Status code
        status: u16,
        /// Response body
        body: String,
    },

    /// Response body that does not decode
    #[error("failed to decode response from {path}: {message}")]
    Decode {
        /// Request path
        path: String,
        /// Decoder message
        message: String,
    },

    /// Token acquisition failed
    #[error("could not authenticate with the director: {0}")]
    Authentication(String),

    /// The Director has not been set up, or never became ready
    #[error("{0}")]
    Unavailable(String),

    /// Remote object missing
    #[error("could not find {kind} {name:?}")]
    NotFound {
        /// Object kind, e.g. "product"
        kind: &'static str,
        /// Name or guid
        name: String,
    },

    /// Streamed body shorter or longer than advertised
    #[error("invalid response length (expected {expected}, got {received})")]
    Length {
        /// Content-Length
        expected: u64,
        /// Bytes written
        received: u64,
    },

    /// The installation ended in failure
    #[error("installation was unsuccessful")]
    InstallationFailed {
        /// Installation id
        id: u64,
    },

    /// An error with the step that produced it
    #[error("{context}: {source}")]
    Context {
        /// What was being attempted
        context: &'static str,
        /// Underlying error
        #[source]
        source: Box<DirectorError>,
    },

    /// The invocation was cancelled
    #[error("operation cancelled")]
    Cancelled,

    /// Configuration section could not be converted
    #[error("could not convert {section} for the director: {message}")]
    Config {
        /// Section key
        section: String,
        /// Conversion message
        message: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Progress reporting or local copy failure
    #[error(transparent)]
    Artifact(#[from] om_artifact::ArtifactError),
}

/// Result type for Director operations
pub type Result<T> = std::result::Result<T, DirectorError>;

impl DirectorError {
    /// Create a not-found error for a product
    pub fn product_not_found(name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "product",
            name: name.into(),
        }
    }

    /// Prefix the error with the step that failed
    pub fn context(self, context: &'static str) -> Self {
        Self::Context {
            context,
            source: Box::new(self),
        }
    }

    /// HTTP status of an API error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Context { source, .. } => source.status(),
            _ => None,
        }
    }

    /// Whether the invocation was cancelled somewhere below
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::Context { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }
}
