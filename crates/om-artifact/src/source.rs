//! The catalog capability and a filesystem-backed implementation.

use std::path::{Component, Path, PathBuf};
use std::pin::Pin;

use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::error::{ArtifactError, Result};

/// An object listed by a catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogObject {
    /// Full key, `/`-separated
    pub key: String,
    pub size: u64,
}

impl CatalogObject {
    /// Last path segment of the key
    pub fn base_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}

/// An open object with its advertised size
pub struct ArtifactReader {
    pub size: u64,
    pub reader: Pin<Box<dyn AsyncRead + Send>>,
}

impl std::fmt::Debug for ArtifactReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactReader")
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

/// A catalog of versioned artifacts
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    /// Short name used in messages
    fn name(&self) -> &str;

    /// Every object in the catalog
    async fn list(&self) -> Result<Vec<CatalogObject>>;

    /// Open one object for streaming
    async fn open(&self, key: &str) -> Result<ArtifactReader>;
}

/// A directory tree used as a catalog, such as a mounted bucket.
#[derive(Debug, Clone)]
pub struct LocalSource {
    root: PathBuf,
}

impl LocalSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key.trim_start_matches('/'));
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(self.not_found(key));
        }
        Ok(self.root.join(relative))
    }

    fn not_found(&self, key: &str) -> ArtifactError {
        ArtifactError::NotFound {
            source_name: self.name().to_string(),
            key: key.to_string(),
        }
    }
}

#[async_trait]
impl ArtifactSource for LocalSource {
    fn name(&self) -> &str {
        "local"
    }

    async fn list(&self) -> Result<Vec<CatalogObject>> {
        let root = self.root.clone();
        let listed = tokio::task::spawn_blocking(move || -> Result<Vec<CatalogObject>> {
            let mut objects = Vec::new();
            for entry in walkdir::WalkDir::new(&root).sort_by_file_name() {
                let entry = entry.map_err(|e| ArtifactError::Source {
                    source_name: "local".to_string(),
                    message: e.to_string(),
                })?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let Ok(relative) = entry.path().strip_prefix(&root) else {
                    continue;
                };
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                objects.push(CatalogObject {
                    key,
                    size: entry.metadata().map(|m| m.len()).unwrap_or(0),
                });
            }
            Ok(objects)
        })
        .await
        .map_err(|e| ArtifactError::Source {
            source_name: "local".to_string(),
            message: e.to_string(),
        })??;

        tracing::debug!(root = %self.root.display(), objects = listed.len(), "listed local catalog");
        Ok(listed)
    }

    async fn open(&self, key: &str) -> Result<ArtifactReader> {
        let path = self.resolve(key)?;
        let file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(self.not_found(key)),
            Err(e) => return Err(e.into()),
        };
        let size = file.metadata().await?.len();
        Ok(ArtifactReader {
            size,
            reader: Box::pin(file),
        })
    }
}
