//! `download-product`: fetch one artifact from a directory or bucket catalog

use std::path::PathBuf;

use clap::Args;
use om_artifact::gcs::DEFAULT_ENDPOINT;
use om_artifact::{ArtifactSource, DownloadReceipt, GcsSource, LocalSource, Resolver, VersionSelector};

use crate::error::{CliError, CliResult};
use crate::output::{print_info, print_success};
use crate::progress::BarProgress;

/// Arguments of `download-product`
#[derive(Debug, Clone, Args)]
pub struct DownloadProductArgs {
    /// Directory used as the artifact catalog, e.g. a mounted bucket
    #[arg(long, required_unless_present = "gcs_bucket", conflicts_with = "gcs_bucket")]
    pub source_dir: Option<PathBuf>,

    /// Cloud Storage bucket used as the artifact catalog
    #[arg(long)]
    pub gcs_bucket: Option<String>,

    /// OAuth access token for the bucket; anonymous when unset
    #[arg(long, env = "OM_GCS_ACCESS_TOKEN", hide_env_values = true)]
    pub gcs_access_token: Option<String>,

    /// Cloud Storage JSON API endpoint
    #[arg(long, default_value = DEFAULT_ENDPOINT)]
    pub gcs_endpoint: String,

    /// Only consider objects below this path in the catalog
    #[arg(long)]
    pub source_path_prefix: Option<String>,

    /// Product slug, the `<slug>` of `<slug>-<version>_<file>`
    #[arg(short = 'n', long)]
    pub product_slug: String,

    /// Exact version to download
    #[arg(long, conflicts_with = "product_version_regex", required_unless_present = "product_version_regex")]
    pub product_version: Option<String>,

    /// Download the highest version matching this regex
    #[arg(short = 'r', long)]
    pub product_version_regex: Option<String>,

    /// Glob that must match exactly one file of the version
    #[arg(short = 'f', long)]
    pub file_glob: String,

    /// Directory to write the file and receipt into
    #[arg(short, long)]
    pub output_directory: PathBuf,
}

/// `download-product`
pub async fn download_product(args: DownloadProductArgs) -> CliResult<()> {
    let selector = match (args.product_version.clone(), args.product_version_regex.clone()) {
        (Some(version), None) => VersionSelector::Exact(version),
        (None, Some(pattern)) => VersionSelector::Matching(pattern),
        _ => {
            return Err(CliError::invalid(
                "exactly one of --product-version and --product-version-regex is required",
            ))
        }
    };

    match (&args.source_dir, &args.gcs_bucket) {
        (Some(dir), None) => {
            let source = LocalSource::new(dir);
            fetch(source, &args, &selector).await
        }
        (None, Some(bucket)) => {
            let mut source = GcsSource::with_endpoint(&args.gcs_endpoint, bucket.as_str())?;
            if let Some(token) = &args.gcs_access_token {
                source = source.with_access_token(token.as_str());
            }
            if let Some(prefix) = &args.source_path_prefix {
                source = source.with_prefix(prefix.as_str());
            }
            fetch(source, &args, &selector).await
        }
        _ => Err(CliError::invalid("exactly one of --source-dir and --gcs-bucket is required")),
    }
}

async fn fetch<S: ArtifactSource>(
    source: S,
    args: &DownloadProductArgs,
    selector: &VersionSelector,
) -> CliResult<()> {
    let mut resolver = Resolver::new(source);
    if let Some(prefix) = &args.source_path_prefix {
        resolver = resolver.with_prefix(prefix.as_str());
    }
    tracing::debug!(source = resolver.source().name(), slug = %args.product_slug, "resolving product");

    let version = resolver.resolve_version(&args.product_slug, selector).await?;
    let descriptor = resolver
        .latest_file(&args.product_slug, &version, &args.file_glob)
        .await?;
    print_info(&format!(
        "downloading {} {} ({})",
        descriptor.slug, descriptor.version, descriptor.file_name
    ));

    tokio::fs::create_dir_all(&args.output_directory).await?;
    let dest = args.output_directory.join(&descriptor.file_name);
    let mut progress = BarProgress::new(descriptor.file_name.clone());
    resolver.download(&descriptor, &dest, &mut progress).await?;

    let receipt = DownloadReceipt::new(&descriptor, &dest)
        .write_to(&args.output_directory)
        .await?;
    print_success(&format!(
        "downloaded {} (receipt at {})",
        dest.display(),
        receipt.display()
    ));
    Ok(())
}
