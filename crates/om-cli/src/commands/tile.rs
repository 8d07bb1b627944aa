//! Local tile commands: `replace-release` and `tile-metadata`

use std::path::PathBuf;

use clap::Args;
use om_tile::{read_manifest, read_metadata, ReplaceRelease};

use crate::error::{CliError, CliResult};
use crate::output::{print_info, print_success};

/// Arguments of `replace-release`
#[derive(Debug, Clone, Args)]
pub struct ReplaceReleaseArgs {
    /// Tile to read
    #[arg(short, long)]
    pub input: PathBuf,

    /// Tile to write
    #[arg(long)]
    pub output: PathBuf,

    /// Release to swap out, `<name>/<version>[:<sha1>]`
    #[arg(short, long)]
    pub release: String,

    /// Tarball of the new release
    #[arg(short, long)]
    pub new_release: PathBuf,

    /// Product version written to the manifest
    #[arg(long)]
    pub new_version: String,
}

/// Arguments of `tile-metadata`
#[derive(Debug, Clone, Args)]
pub struct TileMetadataArgs {
    /// Path to the tile
    #[arg(short = 'f', long)]
    pub product_path: PathBuf,

    /// Print the product name
    #[arg(long)]
    pub product_name: bool,

    /// Print the product version
    #[arg(long)]
    pub product_version: bool,
}

/// `replace-release`
pub fn replace_release(args: ReplaceReleaseArgs) -> CliResult<()> {
    let job = ReplaceRelease {
        input: args.input,
        output: args.output,
        existing_release: args.release,
        new_release: args.new_release,
        new_version: args.new_version,
    };
    let outcome = job.run()?;
    print_info(&format!(
        "replaced {} with {}",
        outcome.existing.id(),
        outcome.replacement.id()
    ));
    print_success(&format!(
        "wrote {} ({} entries)",
        job.output.display(),
        outcome.entries
    ));
    Ok(())
}

/// `tile-metadata`; without a selector the whole manifest is printed.
pub fn tile_metadata(args: TileMetadataArgs) -> CliResult<()> {
    if !args.product_name && !args.product_version {
        let raw = read_metadata(&args.product_path)?;
        print!("{}", String::from_utf8_lossy(&raw));
        return Ok(());
    }

    let manifest = read_manifest(&args.product_path)?;
    if args.product_name {
        let name = manifest
            .name()
            .ok_or_else(|| CliError::NotFound("tile manifest has no name".into()))?;
        println!("{}", name);
    }
    if args.product_version {
        let version = manifest
            .product_version()
            .ok_or_else(|| CliError::NotFound("tile manifest has no product_version".into()))?;
        println!("{}", version);
    }
    Ok(())
}
