//! Release identity and descriptors.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::OnceLock;

use flate2::read::GzDecoder;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use crate::error::{Result, TileError};
use crate::layout::Document;

const RELEASE_MANIFEST: &str = "release.MF";

fn release_id_pattern() -> Result<&'static Regex> {
    static PATTERN: OnceLock<std::result::Result<Regex, regex::Error>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^(?P<name>[^/\n]*)/(?P<version>[^:\n]*)(:(?P<digest>.*))?$"))
        .as_ref()
        .map_err(|e| TileError::Pattern(e.clone()))
}

/// `<name>/<version>[:<sha1>]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseId {
    pub name: String,
    pub version: String,
    pub digest: Option<String>,
}

impl ReleaseId {
    pub fn parse(raw: &str) -> Result<Self> {
        let caps = release_id_pattern()?
            .captures(raw)
            .ok_or_else(|| TileError::InvalidReleaseId(raw.to_string()))?;
        let digest = caps
            .name("digest")
            .map(|m| m.as_str().to_string())
            .filter(|d| !d.is_empty());
        Ok(Self {
            name: caps["name"].to_string(),
            version: caps["version"].to_string(),
            digest,
        })
    }

    /// Name equal, versions equal ignoring a leading `v`, and digest equal
    /// when one was given.
    pub fn matches(&self, release: &ReleaseDescriptor) -> bool {
        self.name == release.name
            && trim_v(&self.version) == trim_v(&release.version)
            && self.digest.as_ref().map_or(true, |d| *d == release.sha1)
    }
}

impl fmt::Display for ReleaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.version)?;
        if let Some(digest) = &self.digest {
            write!(f, ":{}", digest)?;
        }
        Ok(())
    }
}

fn trim_v(version: &str) -> &str {
    version.strip_prefix('v').unwrap_or(version)
}

/// An entry of a tile manifest's `releases` list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseDescriptor {
    pub name: String,
    pub version: String,
    pub file: String,
    pub sha1: String,
}

impl ReleaseDescriptor {
    /// Describe a release tarball: name and version from its `release.MF`,
    /// SHA-1 over the whole file, and its base name.
    pub fn from_tarball(path: &Path) -> Result<Self> {
        let manifest = read_release_manifest(path)?;
        serde_yaml::from_str::<serde_yaml::Value>(&manifest)?;
        let doc = Document::new(&manifest);
        let field = |key: &str| {
            doc.scalar(key).map(|s| s.value).ok_or_else(|| {
                TileError::InvalidManifest(format!(
                    "{} in {} has no {}",
                    RELEASE_MANIFEST,
                    path.display(),
                    key
                ))
            })
        };
        let name = field("name")?;
        let version = field("version")?;

        let mut hasher = Sha1::new();
        let mut file = File::open(path)?;
        std::io::copy(&mut file, &mut hasher)?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self {
            name,
            version,
            file: file_name,
            sha1: hex::encode(hasher.finalize()),
        })
    }

    /// The full identity, digest included
    pub fn id(&self) -> ReleaseId {
        ReleaseId {
            name: self.name.clone(),
            version: self.version.clone(),
            digest: Some(self.sha1.clone()),
        }
    }
}

fn read_release_manifest(path: &Path) -> Result<String> {
    let file = BufReader::new(File::open(path)?);
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    for entry in archive.entries()? {
        let mut entry = entry?;
        let is_manifest = entry
            .path()?
            .file_name()
            .map_or(false, |n| n == RELEASE_MANIFEST);
        if is_manifest {
            let mut contents = String::new();
            entry.read_to_string(&mut contents)?;
            return Ok(contents);
        }
    }
    Err(TileError::ReleaseManifestMissing {
        tarball: path.to_path_buf(),
    })
}
