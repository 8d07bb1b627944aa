//! Error types for artifact resolution and download

use std::path::PathBuf;
use thiserror::Error;

/// Artifact error type
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// The catalog has nothing for the slug
    #[error("no files matching product slug {slug} found")]
    NoVersions {
        /// Product slug
        slug: String,
    },

    /// The requested version or version pattern matched nothing
    #[error("no valid versions found for product {slug:?} and product version {requested:?}\nexisting versions: {}", display_list(.existing, ", "))]
    VersionNotFound {
        /// Product slug
        slug: String,
        /// Exact version or regex as given
        requested: String,
        /// Versions the catalog does have
        existing: Vec<String>,
    },

    /// No file of the version matches the glob
    #[error("the glob '{glob}' matches no file\navailable files: {}", display_list(.available, ", "))]
    NoMatch {
        /// Glob as given
        glob: String,
        /// Files carrying the slug/version prefix
        available: Vec<String>,
    },

    /// More than one file of the version matches the glob
    #[error("the glob '{glob}' matches multiple files. Write your glob to match exactly one of the following:\n  {}", .candidates.join("\n  "))]
    AmbiguousGlob {
        /// Glob as given
        glob: String,
        /// Every matching object key
        candidates: Vec<String>,
    },

    /// Pattern that does not compile
    #[error("could not compile {kind} {pattern:?}: {reason}")]
    InvalidPattern {
        /// "regex" or "glob"
        kind: &'static str,
        /// Pattern as given
        pattern: String,
        /// Compiler message
        reason: String,
    },

    /// Object that is not in the catalog
    #[error("artifact {key:?} not found in {source_name}")]
    NotFound {
        /// Catalog name
        source_name: String,
        /// Object key
        key: String,
    },

    /// Stream ended before the advertised size
    #[error("download of {} was truncated: expected {expected} bytes, received {received}", .path.display())]
    Truncated {
        /// Destination file
        path: PathBuf,
        /// Advertised size
        expected: u64,
        /// Bytes received
        received: u64,
    },

    /// Catalog backend failure
    #[error("{source_name}: {message}")]
    Source {
        /// Catalog name
        source_name: String,
        /// Backend message
        message: String,
    },

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for artifact operations
pub type Result<T> = std::result::Result<T, ArtifactError>;

fn display_list(items: &[String], separator: &str) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join(separator)
    }
}
