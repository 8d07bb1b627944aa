//! Version listing and exactly-one file selection over a catalog.

use regex::Regex;

use crate::error::{ArtifactError, Result};
use crate::source::{ArtifactSource, CatalogObject};

/// A selected artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactDescriptor {
    pub slug: String,
    pub version: String,
    /// Full object key in the catalog
    pub key: String,
    /// Base name of the object
    pub file_name: String,
    pub size: u64,
}

/// How to choose a product version
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSelector {
    /// This version, which must exist
    Exact(String),
    /// The highest semantic version matching the regex
    Matching(String),
}

impl VersionSelector {
    fn requested(&self) -> &str {
        match self {
            Self::Exact(v) | Self::Matching(v) => v,
        }
    }
}

/// Resolves slugs, versions and globs against one catalog.
///
/// Object names are expected to look like `<slug>-<version>_<rest>`,
/// optionally below a path prefix.
#[derive(Debug, Clone)]
pub struct Resolver<S> {
    source: S,
    prefix: Option<String>,
}

impl<S: ArtifactSource> Resolver<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            prefix: None,
        }
    }

    /// Only consider objects below `prefix`.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into().trim_matches('/').to_string();
        self.prefix = (!prefix.is_empty()).then_some(prefix);
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    async fn objects(&self) -> Result<Vec<CatalogObject>> {
        let objects = self.source.list().await?;
        let Some(prefix) = &self.prefix else {
            return Ok(objects);
        };
        let prefix = format!("{}/", prefix);
        Ok(objects
            .into_iter()
            .filter(|o| o.key.trim_start_matches('/').starts_with(&prefix))
            .collect())
    }

    /// Versions of `slug`, deduplicated in first-seen order.
    pub async fn list_versions(&self, slug: &str) -> Result<Vec<String>> {
        let pattern = version_pattern(slug)?;
        let mut versions: Vec<String> = Vec::new();
        for object in self.objects().await? {
            if let Some(caps) = pattern.captures(object.base_name()) {
                let version = &caps["ver"];
                if !versions.iter().any(|v| v == version) {
                    versions.push(version.to_string());
                }
            }
        }
        if versions.is_empty() {
            return Err(ArtifactError::NoVersions {
                slug: slug.to_string(),
            });
        }
        Ok(versions)
    }

    /// Pick a version of `slug`.
    pub async fn resolve_version(&self, slug: &str, selector: &VersionSelector) -> Result<String> {
        let versions = match self.list_versions(slug).await {
            Ok(versions) => versions,
            Err(ArtifactError::NoVersions { .. }) => Vec::new(),
            Err(err) => return Err(err),
        };
        let not_found = |versions: Vec<String>| ArtifactError::VersionNotFound {
            slug: slug.to_string(),
            requested: selector.requested().to_string(),
            existing: versions,
        };

        match selector {
            VersionSelector::Exact(wanted) => {
                if versions.iter().any(|v| v == wanted) {
                    Ok(wanted.clone())
                } else {
                    Err(not_found(versions))
                }
            }
            VersionSelector::Matching(regex) => {
                let re = Regex::new(regex).map_err(|e| ArtifactError::InvalidPattern {
                    kind: "regex",
                    pattern: regex.clone(),
                    reason: e.to_string(),
                })?;
                let best = versions
                    .iter()
                    .filter(|v| re.is_match(v))
                    .filter_map(|v| match parse_lenient(v) {
                        Some(parsed) => Some((parsed, v)),
                        None => {
                            tracing::warn!(version = %v, "could not parse semver version");
                            None
                        }
                    })
                    .max_by(|a, b| a.0.cmp(&b.0))
                    .map(|(_, v)| v.clone());
                best.ok_or_else(|| not_found(versions))
            }
        }
    }

    /// The single file of `slug` at `version` whose base name matches `glob`.
    pub async fn latest_file(&self, slug: &str, version: &str, glob: &str) -> Result<ArtifactDescriptor> {
        let pattern = glob::Pattern::new(glob).map_err(|e| ArtifactError::InvalidPattern {
            kind: "glob",
            pattern: glob.to_string(),
            reason: e.to_string(),
        })?;
        let prefix = format!("{}-{}", slug, version);

        let prefixed: Vec<CatalogObject> = self
            .objects()
            .await?
            .into_iter()
            .filter(|o| o.base_name().starts_with(&prefix))
            .collect();
        let mut matched: Vec<&CatalogObject> = prefixed
            .iter()
            .filter(|o| pattern.matches(o.base_name()))
            .collect();

        match matched.len() {
            0 => Err(ArtifactError::NoMatch {
                glob: glob.to_string(),
                available: prefixed.iter().map(|o| o.key.clone()).collect(),
            }),
            1 => {
                let object = matched.remove(0);
                tracing::debug!(key = %object.key, "selected artifact");
                Ok(ArtifactDescriptor {
                    slug: slug.to_string(),
                    version: version.to_string(),
                    key: object.key.clone(),
                    file_name: object.base_name().to_string(),
                    size: object.size,
                })
            }
            _ => Err(ArtifactError::AmbiguousGlob {
                glob: glob.to_string(),
                candidates: matched.iter().map(|o| o.key.clone()).collect(),
            }),
        }
    }
}

fn version_pattern(slug: &str) -> Result<Regex> {
    let raw = format!(r"^{}-(?P<ver>[^_]+)_", regex::escape(slug));
    Regex::new(&raw).map_err(|e| ArtifactError::InvalidPattern {
        kind: "regex",
        pattern: raw,
        reason: e.to_string(),
    })
}

/// Parse a version as semver, padding `1` and `1.2` to three components
/// and ignoring a leading `v`.
pub fn parse_lenient(version: &str) -> Option<semver::Version> {
    let version = version.strip_prefix('v').unwrap_or(version);
    let split = version.find(['-', '+']).unwrap_or(version.len());
    let (core, suffix) = version.split_at(split);

    let parts: Vec<&str> = core.split('.').collect();
    if parts.is_empty()
        || parts.len() > 3
        || parts.iter().any(|p| p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit()))
    {
        return None;
    }
    let mut padded = parts.join(".");
    for _ in parts.len()..3 {
        padded.push_str(".0");
    }
    semver::Version::parse(&format!("{}{}", padded, suffix)).ok()
}
