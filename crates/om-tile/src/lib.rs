//! # om-tile
//!
//! Tile archives are zip files holding a YAML manifest at
//! `metadata/metadata.yml` and the release tarballs it lists under
//! `releases/`. This crate reads the manifest and produces a new tile with
//! one embedded release swapped for another, leaving every manifest byte
//! it does not rewrite as it was.

#![deny(unsafe_code)]

pub mod archive;
pub mod error;
mod layout;
pub mod manifest;
pub mod release;

pub use archive::{read_manifest, read_metadata, ReplaceOutcome, ReplaceRelease, METADATA_PATH};
pub use error::{Result, TileError};
pub use manifest::TileManifest;
pub use release::{ReleaseDescriptor, ReleaseId};
