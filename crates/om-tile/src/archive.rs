//! Reading and rewriting tile archives.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{Result, TileError};
use crate::manifest::TileManifest;
use crate::release::{ReleaseDescriptor, ReleaseId};

/// Location of the manifest inside a tile
pub const METADATA_PATH: &str = "metadata/metadata.yml";

/// Directory of embedded release tarballs inside a tile
pub const RELEASES_DIR: &str = "releases";

/// Raw bytes of the tile's manifest.
pub fn read_metadata(archive: &Path) -> Result<Vec<u8>> {
    let mut zip = ZipArchive::new(BufReader::new(File::open(archive)?))?;
    let mut entry = match zip.by_name(METADATA_PATH) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => {
            return Err(TileError::MetadataMissing {
                archive: archive.to_path_buf(),
            })
        }
        Err(err) => return Err(err.into()),
    };
    let mut bytes = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut bytes)?;
    Ok(bytes)
}

/// Parsed manifest of a tile
pub fn read_manifest(archive: &Path) -> Result<TileManifest> {
    TileManifest::parse(&read_metadata(archive)?)
}

/// Inputs to a release replacement
#[derive(Debug, Clone)]
pub struct ReplaceRelease {
    /// Tile to read
    pub input: PathBuf,
    /// Tile to write; replaced atomically on success
    pub output: PathBuf,
    /// `<name>/<version>[:<sha1>]` of the release to swap out
    pub existing_release: String,
    /// New release tarball
    pub new_release: PathBuf,
    /// Product version written to the manifest
    pub new_version: String,
}

/// What a replacement did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplaceOutcome {
    pub existing: ReleaseDescriptor,
    pub replacement: ReleaseDescriptor,
    /// Number of entries written to the output
    pub entries: usize,
}

impl ReplaceRelease {
    /// Write a copy of the input tile with one release swapped.
    ///
    /// Entries are streamed in input order. Auxiliary entries are copied
    /// without recompression, the manifest is rewritten, and the old
    /// release entry becomes `releases/<basename of new tarball>`.
    pub fn run(&self) -> Result<ReplaceOutcome> {
        let id = ReleaseId::parse(&self.existing_release)?;
        let replacement = ReleaseDescriptor::from_tarball(&self.new_release)?;
        tracing::info!(release = %replacement.id(), "calculated new release metadata");

        let mut manifest = read_manifest(&self.input)?;
        let existing = manifest.find_release(&id, Some(&replacement))?;
        tracing::info!(release = %existing.id(), "found existing release metadata");

        manifest.rewrite(&existing, &replacement, &self.new_version)?;
        let metadata = manifest.into_bytes();

        let dir = match self.output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let staging = NamedTempFile::new_in(&dir)?;
        let entries = self.write_tile(staging.as_file(), &existing, &replacement, &metadata)?;
        staging
            .persist(&self.output)
            .map_err(|err| TileError::Io(err.error))?;

        tracing::info!(output = %self.output.display(), entries, "created new tile");
        Ok(ReplaceOutcome {
            existing,
            replacement,
            entries,
        })
    }

    fn write_tile(
        &self,
        out: &File,
        existing: &ReleaseDescriptor,
        replacement: &ReleaseDescriptor,
        metadata: &[u8],
    ) -> Result<usize> {
        let mut input = ZipArchive::new(BufReader::new(File::open(&self.input)?))?;
        let mut output = ZipWriter::new(out);
        let old_path = format!("{}/{}", RELEASES_DIR, existing.file);
        let new_path = format!("{}/{}", RELEASES_DIR, replacement.file);
        let mut replaced = false;

        for index in 0..input.len() {
            let entry = input.by_index_raw(index)?;
            let name = entry.name().to_string();

            if name == old_path {
                drop(entry);
                tracing::debug!(from = %old_path, to = %new_path, "adding updated release");
                let mut tarball = File::open(&self.new_release)?;
                let size = tarball.metadata()?.len();
                let options = FileOptions::default()
                    .compression_method(CompressionMethod::Stored)
                    .large_file(size > u64::from(u32::MAX));
                output.start_file(new_path.as_str(), options)?;
                io::copy(&mut tarball, &mut output)?;
                replaced = true;
            } else if name == METADATA_PATH {
                drop(entry);
                tracing::debug!("adding updated tile metadata");
                let options =
                    FileOptions::default().compression_method(CompressionMethod::Deflated);
                output.start_file(METADATA_PATH, options)?;
                io::Write::write_all(&mut output, metadata)?;
            } else {
                tracing::trace!(entry = %name, "copying from input tile");
                output.raw_copy_file(entry)?;
            }
        }

        if !replaced {
            return Err(TileError::ReleaseFileMissing {
                id: existing.id().to_string(),
                path: old_path,
            });
        }
        output.finish()?;
        Ok(input.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::release::tests::{sha1_of, write_release};
    use sha1::{Digest, Sha1};
    use std::collections::BTreeMap;
    use std::io::Write;

    fn write_tile(dir: &Path, manifest: &str, releases: &[(&str, &Path)]) -> PathBuf {
        let path = dir.join("tile.pivotal");
        let mut zip = ZipWriter::new(File::create(&path).unwrap());
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

        zip.start_file("metadata/metadata.yml", options).unwrap();
        zip.write_all(manifest.as_bytes()).unwrap();
        for (name, tarball) in releases {
            zip.start_file(format!("releases/{}", name), options).unwrap();
            zip.write_all(&std::fs::read(tarball).unwrap()).unwrap();
        }
        zip.start_file("migrations/v1/201701011200_noop.js", options).unwrap();
        zip.write_all(b"exports.migrate = function(input) { return input; };").unwrap();
        zip.finish().unwrap();
        path
    }

    /// (entry name -> sha1 of contents)
    fn digests(path: &Path) -> BTreeMap<String, String> {
        let mut zip = ZipArchive::new(File::open(path).unwrap()).unwrap();
        let mut out = BTreeMap::new();
        for i in 0..zip.len() {
            let mut entry = zip.by_index(i).unwrap();
            let mut bytes = Vec::new();
            entry.read_to_end(&mut bytes).unwrap();
            out.insert(entry.name().to_string(), hex::encode(Sha1::digest(&bytes)));
        }
        out
    }

    struct Fixture {
        dir: tempfile::TempDir,
        tile: PathBuf,
        new_release: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let old = write_release(dir.path(), "cfn-1.0.tgz", "cfn", "1.0");
        let other = write_release(dir.path(), "routing-0.9.tgz", "routing", "0.9");
        let manifest = format!(
            "# example tile\nname: example\nproduct_version: 1.0.0 # bumped\nreleases:\n\
             - name: cfn\n  version: '1.0'\n  file: cfn-1.0.tgz\n  sha1: {}\n\
             - name: routing\n  version: '0.9'\n  file: routing-0.9.tgz\n  sha1: {}\n",
            sha1_of(&old),
            sha1_of(&other)
        );
        let tile = write_tile(
            dir.path(),
            &manifest,
            &[("cfn-1.0.tgz", old.as_path()), ("routing-0.9.tgz", other.as_path())],
        );

        let new_dir = dir.path().join("new");
        std::fs::create_dir(&new_dir).unwrap();
        let new_release = write_release(&new_dir, "cfn-1.1.tgz", "cfn", "1.1");
        Fixture {
            dir,
            tile,
            new_release,
        }
    }

    fn request(f: &Fixture, input: &Path, output: &str) -> ReplaceRelease {
        ReplaceRelease {
            input: input.to_path_buf(),
            output: f.dir.path().join(output),
            existing_release: "cfn/1.0".to_string(),
            new_release: f.new_release.clone(),
            new_version: "1.0.1".to_string(),
        }
    }

    #[test]
    fn test_read_metadata() {
        let f = fixture();
        let manifest = read_manifest(&f.tile).unwrap();
        assert_eq!(manifest.name().as_deref(), Some("example"));
    }

    #[test]
    fn test_metadata_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.zip");
        let mut zip = ZipWriter::new(File::create(&path).unwrap());
        zip.start_file("readme.txt", FileOptions::default()).unwrap();
        zip.finish().unwrap();

        let err = read_metadata(&path).unwrap_err();
        assert!(matches!(err, TileError::MetadataMissing { .. }));
    }

    #[test]
    fn test_replace_release() {
        let f = fixture();
        let outcome = request(&f, &f.tile, "out.pivotal").run().unwrap();
        let expected_sha1 = sha1_of(&f.new_release);

        assert_eq!(outcome.existing.file, "cfn-1.0.tgz");
        assert_eq!(outcome.replacement.sha1, expected_sha1);
        assert_eq!(outcome.entries, 4);

        let out = f.dir.path().join("out.pivotal");
        let entries = digests(&out);
        assert!(!entries.contains_key("releases/cfn-1.0.tgz"));
        assert_eq!(entries.get("releases/cfn-1.1.tgz"), Some(&expected_sha1));
        assert!(entries.contains_key("releases/routing-0.9.tgz"));
        assert!(entries.contains_key("migrations/v1/201701011200_noop.js"));

        let metadata = String::from_utf8(read_metadata(&out).unwrap()).unwrap();
        assert!(metadata.starts_with("# example tile\nname: example\nproduct_version: 1.0.1 # bumped\n"));
        assert!(metadata.contains("- name: routing\n  version: '0.9'\n"));

        let manifest = read_manifest(&out).unwrap();
        assert_eq!(manifest.product_version().as_deref(), Some("1.0.1"));
        let matching: Vec<_> = manifest
            .releases()
            .unwrap()
            .into_iter()
            .filter(|r| r.name == "cfn")
            .collect();
        assert_eq!(matching.len(), 1);
        assert_eq!(matching[0].version, "1.1");
        assert_eq!(matching[0].file, "cfn-1.1.tgz");
        assert_eq!(matching[0].sha1, expected_sha1);
    }

    #[test]
    fn test_auxiliary_entries_are_unchanged() {
        let f = fixture();
        request(&f, &f.tile, "out.pivotal").run().unwrap();
        let before = digests(&f.tile);
        let after = digests(&f.dir.path().join("out.pivotal"));
        assert_eq!(
            before.get("migrations/v1/201701011200_noop.js"),
            after.get("migrations/v1/201701011200_noop.js")
        );
        assert_eq!(before.get("releases/routing-0.9.tgz"), after.get("releases/routing-0.9.tgz"));
    }

    #[test]
    fn test_replace_is_idempotent() {
        let f = fixture();
        request(&f, &f.tile, "once.pivotal").run().unwrap();
        let once = f.dir.path().join("once.pivotal");
        request(&f, &once, "twice.pivotal").run().unwrap();

        let twice = f.dir.path().join("twice.pivotal");
        assert_eq!(digests(&once), digests(&twice));
    }

    #[test]
    fn test_release_file_missing() {
        let f = fixture();
        let manifest = format!(
            "name: example\nreleases:\n- {{name: cfn, version: '1.0', file: cfn-1.0.tgz, sha1: {}}}\n",
            "abc"
        );
        let tile = write_tile(f.dir.path(), &manifest, &[]);
        let err = request(&f, &tile, "out.pivotal").run().unwrap_err();
        assert!(matches!(err, TileError::ReleaseFileMissing { .. }));
        assert!(!f.dir.path().join("out.pivotal").exists());
    }

    #[test]
    fn test_unknown_release() {
        let f = fixture();
        let mut req = request(&f, &f.tile, "out.pivotal");
        req.existing_release = "nope/1.0".to_string();
        let err = req.run().unwrap_err();
        assert!(matches!(err, TileError::ReleaseNotFound { .. }));
    }
}
