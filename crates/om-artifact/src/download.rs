//! Streaming an artifact to disk and recording what was fetched.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ArtifactError, Result};
use crate::progress::{copy_with_progress, ProgressSink};
use crate::resolver::{ArtifactDescriptor, Resolver};
use crate::source::ArtifactSource;

/// File name of the receipt written next to downloads
pub const RECEIPT_FILE: &str = "download-file.json";

/// Suffix of in-flight downloads
const PARTIAL_SUFFIX: &str = ".partial";

impl<S: ArtifactSource> Resolver<S> {
    /// Stream `descriptor` to `dest`.
    ///
    /// Bytes land in `<dest>.partial` first; the file is renamed only once
    /// the advertised size has arrived.
    pub async fn download(
        &self,
        descriptor: &ArtifactDescriptor,
        dest: &Path,
        progress: &mut dyn ProgressSink,
    ) -> Result<u64> {
        let mut opened = self.source().open(&descriptor.key).await?;
        let partial = partial_path(dest);
        tracing::info!(key = %descriptor.key, dest = %dest.display(), size = opened.size, "downloading artifact");

        let mut file = tokio::fs::File::create(&partial).await?;
        let copied = match copy_with_progress(&mut opened.reader, &mut file, Some(opened.size), progress).await {
            Ok(copied) => copied,
            Err(err) => {
                drop(file);
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(err);
            }
        };
        file.sync_all().await?;
        drop(file);

        if copied != opened.size {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(ArtifactError::Truncated {
                path: dest.to_path_buf(),
                expected: opened.size,
                received: copied,
            });
        }

        tokio::fs::rename(&partial, dest).await?;
        progress.finish();
        Ok(copied)
    }
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

/// Record of a completed product download
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadReceipt {
    pub product_slug: String,
    pub product_version: String,
    pub product_path: String,
}

impl DownloadReceipt {
    pub fn new(descriptor: &ArtifactDescriptor, path: &Path) -> Self {
        Self {
            product_slug: descriptor.slug.clone(),
            product_version: descriptor.version.clone(),
            product_path: path.display().to_string(),
        }
    }

    /// Write `download-file.json` into `dir`.
    pub async fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(RECEIPT_FILE);
        let body = serde_json::to_vec_pretty(self)?;
        tokio::fs::write(&path, body).await?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::tests::RecordingProgress;
    use crate::resolver::tests::MemorySource;
    use crate::source::{ArtifactReader, CatalogObject};

    #[tokio::test]
    async fn test_download_renames_partial() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = Resolver::new(MemorySource::new(&["cf-2.0.1_cf.pivotal"]));
        let descriptor = resolver.latest_file("cf", "2.0.1", "*.pivotal").await.unwrap();
        let dest = dir.path().join(&descriptor.file_name);
        let mut progress = RecordingProgress::default();

        let copied = resolver.download(&descriptor, &dest, &mut progress).await.unwrap();

        assert_eq!(copied, 16);
        assert_eq!(std::fs::metadata(&dest).unwrap().len(), 16);
        assert!(!partial_path(&dest).exists());
        let events = progress.events.lock().clone();
        assert_eq!(events.first().map(String::as_str), Some("total 16"));
        assert_eq!(events.last().map(String::as_str), Some("finish"));
    }

    /// Advertises more bytes than it yields
    struct ShortSource;

    #[async_trait::async_trait]
    impl ArtifactSource for ShortSource {
        fn name(&self) -> &str {
            "short"
        }

        async fn list(&self) -> Result<Vec<CatalogObject>> {
            Ok(vec![CatalogObject {
                key: "cf-2.0.1_cf.pivotal".into(),
                size: 32,
            }])
        }

        async fn open(&self, _key: &str) -> Result<ArtifactReader> {
            Ok(ArtifactReader {
                size: 32,
                reader: Box::pin(std::io::Cursor::new(vec![1u8; 10])),
            })
        }
    }

    #[tokio::test]
    async fn test_download_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = Resolver::new(ShortSource);
        let descriptor = resolver.latest_file("cf", "2.0.1", "*").await.unwrap();
        let dest = dir.path().join(&descriptor.file_name);

        let err = resolver
            .download(&descriptor, &dest, &mut crate::progress::NoProgress)
            .await
            .unwrap_err();

        match err {
            ArtifactError::Truncated { expected, received, .. } => {
                assert_eq!((expected, received), (32, 10));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!dest.exists());
        assert!(!partial_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_download_unknown_key() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = Resolver::new(MemorySource::new(&["cf-2.0.1_cf.pivotal"]));
        let descriptor = ArtifactDescriptor {
            slug: "cf".into(),
            version: "2.0.1".into(),
            key: "missing".into(),
            file_name: "missing".into(),
            size: 0,
        };
        let dest = dir.path().join("missing");
        let err = resolver
            .download(&descriptor, &dest, &mut crate::progress::NoProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, ArtifactError::NotFound { .. }));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_receipt_written() {
        let dir = tempfile::tempdir().unwrap();
        let descriptor = ArtifactDescriptor {
            slug: "cf".into(),
            version: "2.0.1".into(),
            key: "cf-2.0.1_cf.pivotal".into(),
            file_name: "cf-2.0.1_cf.pivotal".into(),
            size: 16,
        };
        let receipt = DownloadReceipt::new(&descriptor, Path::new("/tmp/cf-2.0.1_cf.pivotal"));
        let path = receipt.write_to(dir.path()).await.unwrap();
        let parsed: serde_json::Value =
            serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
        assert_eq!(parsed["product_slug"], "cf");
        assert_eq!(parsed["product_version"], "2.0.1");
        assert_eq!(parsed["product_path"], "/tmp/cf-2.0.1_cf.pivotal");
    }
}
