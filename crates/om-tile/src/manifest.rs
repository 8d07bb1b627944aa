//! Tile manifest (`metadata/metadata.yml`) access and rewriting.
//!
//! The manifest is kept as the text it was read from. Rewrites splice new
//! values into the spans of the nodes they change, so comments, quoting and
//! the spelling of every other scalar survive untouched.

use serde_yaml::Value;

use crate::error::{Result, TileError};
use crate::layout::{render, splice, Document, Entry, Style};
use crate::release::{ReleaseDescriptor, ReleaseId};

/// A tile manifest
#[derive(Debug, Clone)]
pub struct TileManifest {
    source: String,
}

impl TileManifest {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let source = String::from_utf8(bytes.to_vec())
            .map_err(|_| TileError::InvalidManifest("manifest is not UTF-8".to_string()))?;
        match serde_yaml::from_str(&source)? {
            Value::Mapping(_) => Ok(Self { source }),
            _ => Err(TileError::InvalidManifest(
                "expected a mapping at the top level".to_string(),
            )),
        }
    }

    /// Product name (`name`)
    pub fn name(&self) -> Option<String> {
        Document::new(&self.source).scalar("name").map(|s| s.value)
    }

    /// Product version (`product_version`)
    pub fn product_version(&self) -> Option<String> {
        Document::new(&self.source)
            .scalar("product_version")
            .map(|s| s.value)
    }

    /// Entries of `releases` that carry a name, versions spelled as written.
    pub fn releases(&self) -> Result<Vec<ReleaseDescriptor>> {
        Ok(Document::new(&self.source)
            .sequence("releases")?
            .iter()
            .filter_map(descriptor_of)
            .collect())
    }

    /// The single release matching `id`.
    ///
    /// When nothing matches but `replacement` is already present, that entry
    /// is returned, so replaying a replacement against its own output finds
    /// the release it put there.
    pub fn find_release(
        &self,
        id: &ReleaseId,
        replacement: Option<&ReleaseDescriptor>,
    ) -> Result<ReleaseDescriptor> {
        let releases = self.releases()?;
        let mut matches: Vec<_> = releases.iter().filter(|r| id.matches(r)).collect();

        if matches.is_empty() {
            if let Some(replacement) = replacement {
                matches = releases.iter().filter(|r| *r == replacement).collect();
            }
        }

        match matches.as_slice() {
            [] => Err(TileError::ReleaseNotFound { id: id.to_string() }),
            [single] => Ok((*single).clone()),
            many => Err(TileError::AmbiguousRelease {
                id: id.to_string(),
                candidates: many.iter().map(|r| r.id().to_string()).collect(),
            }),
        }
    }

    /// Swap the entry equal to `existing` for `replacement` in `releases`
    /// and set every product version field to `new_version`.
    pub fn rewrite(
        &mut self,
        existing: &ReleaseDescriptor,
        replacement: &ReleaseDescriptor,
        new_version: &str,
    ) -> Result<()> {
        let rewritten = {
            let doc = Document::new(&self.source);
            let mut edits = Vec::new();

            let entry = doc
                .sequence("releases")?
                .into_iter()
                .find(|e| descriptor_of(e).as_ref() == Some(existing))
                .ok_or_else(|| TileError::ReleaseNotFound {
                    id: existing.id().to_string(),
                })?;
            edits.push((entry.span.clone(), render_release(&entry, replacement, doc.newline())));

            for provided in doc.sequence("provides_product_versions")? {
                if let Some(version) = provided.get("version") {
                    edits.push((version.span.clone(), render(new_version, version.style)));
                }
            }

            if doc.has_key("product_version") {
                let version = doc.scalar("product_version").ok_or_else(|| {
                    TileError::InvalidManifest("`product_version` must be a single-line scalar".to_string())
                })?;
                edits.push((version.span, render(new_version, version.style)));
            }

            splice(&self.source, edits)?
        };

        *self = Self::parse(rewritten.as_bytes())?;
        Ok(())
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.source.into_bytes()
    }
}

fn descriptor_of(entry: &Entry) -> Option<ReleaseDescriptor> {
    let field = |key: &str| entry.get(key).map(|s| s.value.clone());
    Some(ReleaseDescriptor {
        name: field("name")?,
        version: field("version").unwrap_or_default(),
        file: field("file").unwrap_or_default(),
        sha1: field("sha1").unwrap_or_default(),
    })
}

/// `release` in the layout of the entry it replaces
fn render_release(entry: &Entry, release: &ReleaseDescriptor, newline: &str) -> String {
    let fields: Vec<String> = [
        ("name", &release.name),
        ("version", &release.version),
        ("file", &release.file),
        ("sha1", &release.sha1),
    ]
    .iter()
    .map(|(key, value)| format!("{}: {}", key, render(value, Style::Plain)))
    .collect();

    match entry.column {
        Some(column) => fields.join(format!("{}{}", newline, " ".repeat(column)).as_str()),
        None => format!("{{{}}}", fields.join(", ")),
    }
}
