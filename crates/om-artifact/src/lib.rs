//! # om-artifact
//!
//! Selects exactly one artifact from a catalog and streams it to disk.
//!
//! A catalog is anything implementing [`ArtifactSource`]: a directory
//! ([`LocalSource`]) or a Cloud Storage bucket ([`GcsSource`]). Object names
//! follow `<slug>-<version>_<rest>`; [`Resolver`] lists versions, picks one
//! by exact value or highest semantic version matching a regex, and then
//! narrows the version's files with a shell glob. Anything other than a
//! single match is an error naming the candidates.
//!
//! ```no_run
//! use om_artifact::{LocalSource, NoProgress, Resolver, VersionSelector};
//!
//! # async fn run() -> om_artifact::Result<()> {
//! let resolver = Resolver::new(LocalSource::new("/mnt/bucket")).with_prefix("products");
//! let version = resolver
//!     .resolve_version("cf", &VersionSelector::Matching(r"^2\.".into()))
//!     .await?;
//! let file = resolver.latest_file("cf", &version, "*.pivotal").await?;
//! resolver
//!     .download(&file, std::path::Path::new("/tmp/cf.pivotal"), &mut NoProgress)
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod download;
pub mod error;
pub mod gcs;
pub mod progress;
pub mod resolver;
pub mod source;

pub use download::{DownloadReceipt, RECEIPT_FILE};
pub use error::{ArtifactError, Result};
pub use gcs::GcsSource;
pub use progress::{copy_with_progress, NoProgress, ProgressSink};
pub use resolver::{parse_lenient, ArtifactDescriptor, Resolver, VersionSelector};
pub use source::{ArtifactReader, ArtifactSource, CatalogObject, LocalSource};
