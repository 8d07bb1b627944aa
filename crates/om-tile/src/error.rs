//! Error types for tile handling

use std::path::PathBuf;
use thiserror::Error;

/// Tile error type
#[derive(Debug, Error)]
pub enum TileError {
    /// Release identifier that does not follow `<name>/<version>[:<digest>]`
    #[error("failed to parse release identifier like `<name>/<version>[:<sha1>]` in {0:?}")]
    InvalidReleaseId(String),

    /// Release tarball without a `release.MF`
    #[error("\"release.MF\" not found in {}", .tarball.display())]
    ReleaseManifestMissing {
        /// Tarball that was searched
        tarball: PathBuf,
    },

    /// Archive without `metadata/metadata.yml`
    #[error("failed to find metadata file in {}", .archive.display())]
    MetadataMissing {
        /// Archive that was searched
        archive: PathBuf,
    },

    /// Manifest that is not a mapping or has malformed releases
    #[error("invalid tile manifest: {0}")]
    InvalidManifest(String),

    /// No manifest release matches the identifier
    #[error("failed to find release in tile equal to {id}")]
    ReleaseNotFound {
        /// Identifier that was looked up
        id: String,
    },

    /// More than one manifest release matches the identifier
    #[error("release identifier {id} matches multiple releases: {}", .candidates.join(", "))]
    AmbiguousRelease {
        /// Identifier that was looked up
        id: String,
        /// Every matching release id
        candidates: Vec<String>,
    },

    /// The manifest names a release file the archive does not contain
    #[error("failed to replace release {id} expected to find a release with path {path}")]
    ReleaseFileMissing {
        /// Full id of the release being replaced
        id: String,
        /// Archive path that was expected
        path: String,
    },

    /// Built-in pattern that failed to compile
    #[error("pattern error: {0}")]
    Pattern(#[from] regex::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Archive format error
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type for tile operations
pub type Result<T> = std::result::Result<T, TileError>;
