//! Product commands: upload, stage, unstage, replicate and listings

use std::io::Read;
use std::path::{Path, PathBuf};

use clap::Args;
use om_artifact::parse_lenient;
use om_director::{AvailableProduct, DirectorGateway, StagedProduct};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tabled::Tabled;

use crate::error::{CliError, CliResult};
use crate::output::{self, print_info, print_success, OutputFormat};
use crate::progress::BarProgress;

const INSTALLATION_RUNNING: &str = "OpsManager does not allow configuration or staging changes while apply changes are running to prevent data loss for configuration and/or staging changes";

/// Arguments of `upload-product`
#[derive(Debug, Clone, Args)]
pub struct UploadProductArgs {
    /// Path to the tile
    #[arg(short = 'f', long = "product")]
    pub product: PathBuf,

    /// Fail unless the tile has this product version
    #[arg(long)]
    pub product_version: Option<String>,

    /// Fail unless the tile has this SHA-256
    #[arg(long)]
    pub sha256: Option<String>,
}

/// Arguments of `stage-product`
#[derive(Debug, Clone, Args)]
pub struct StageProductArgs {
    /// Product name
    #[arg(short = 'n', long)]
    pub product_name: String,

    /// Version to stage, or `latest`
    #[arg(long)]
    pub product_version: String,
}

/// Arguments of `unstage-product`
#[derive(Debug, Clone, Args)]
pub struct UnstageProductArgs {
    /// Product name
    #[arg(short = 'n', long)]
    pub product_name: String,
}

/// Arguments of `replicate-product`
#[derive(Debug, Clone, Args)]
pub struct ReplicateProductArgs {
    /// Product name
    #[arg(short = 'n', long)]
    pub product_name: String,

    /// Version of the product to replicate
    #[arg(long)]
    pub product_version: String,

    /// Suffix of the replica's installation name
    #[arg(long)]
    pub replica_suffix: String,
}

#[derive(Debug, Serialize, Tabled)]
struct AvailableRow {
    name: String,
    version: String,
}

impl From<AvailableProduct> for AvailableRow {
    fn from(p: AvailableProduct) -> Self {
        Self {
            name: p.name,
            version: p.product_version,
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
struct ProductRow {
    name: String,
    version: String,
    guid: String,
}

impl From<StagedProduct> for ProductRow {
    fn from(p: StagedProduct) -> Self {
        Self {
            name: p.product_type,
            version: p.product_version.unwrap_or_default(),
            guid: p.guid,
        }
    }
}

/// `upload-product`
pub async fn upload(args: UploadProductArgs, director: &dyn DirectorGateway) -> CliResult<()> {
    if let Some(expected) = &args.sha256 {
        let actual = file_sha256(&args.product)?;
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(CliError::invalid(format!(
                "expected shasum {} does not match file shasum {}",
                expected, actual
            )));
        }
        print_info("expected shasum matches product shasum.");
    }

    let manifest = om_tile::read_manifest(&args.product)?;
    let name = manifest.name().unwrap_or_default();
    let version = manifest.product_version().unwrap_or_default();
    if let Some(expected) = &args.product_version {
        if expected != &version {
            return Err(CliError::invalid(format!(
                "expected version {} does not match product version {}",
                expected, version
            )));
        }
        print_info("expected version matches product version.");
    }

    let available = director
        .list_available_products()
        .await
        .map_err(|e| CliError::remote("failed to check product availability", e))?;
    if available
        .iter()
        .any(|p| p.name == name && p.product_version == version)
    {
        print_success(&format!("product {} {} is already uploaded, nothing to be done.", name, version));
        return Ok(());
    }

    print_info("beginning product upload to Ops Manager");
    let mut progress = BarProgress::new(format!("{} {}", name, version));
    director
        .upload_product(&args.product, &mut progress)
        .await
        .map_err(|e| CliError::remote("failed to upload product", e))?;
    print_success("finished upload");
    Ok(())
}

/// `stage-product`
pub async fn stage(args: StageProductArgs, director: &dyn DirectorGateway) -> CliResult<()> {
    let failed = |e| CliError::remote("failed to stage product", e);
    let name = args.product_name;

    if director.running_installation().await.map_err(failed)?.is_some() {
        return Err(CliError::StateConflict(INSTALLATION_RUNNING.to_string()));
    }

    let available = director.list_available_products().await.map_err(failed)?;
    let version = if args.product_version == "latest" {
        latest_available(&available, &name).ok_or_else(|| {
            CliError::NotFound(format!("failed to stage product: cannot find product {} latest", name))
        })?
    } else {
        args.product_version
    };

    let staged = director.list_staged_products().await.map_err(failed)?;
    let already = staged
        .iter()
        .any(|p| p.product_type == name && p.product_version.as_deref() == Some(version.as_str()));
    if already {
        print_info(&format!("{} {} is already staged", name, version));
        return Ok(());
    }

    if !available
        .iter()
        .any(|p| p.name == name && p.product_version == version)
    {
        return Err(CliError::NotFound(format!(
            "failed to stage product: cannot find product {} {}",
            name, version
        )));
    }

    print_info(&format!("staging {} {}", name, version));
    director.stage_product(&name, &version).await.map_err(failed)?;
    print_success("finished staging");
    Ok(())
}

/// `unstage-product`
pub async fn unstage(args: UnstageProductArgs, director: &dyn DirectorGateway) -> CliResult<()> {
    print_info(&format!("unstaging {}", args.product_name));
    director
        .unstage_product(&args.product_name)
        .await
        .map_err(|e| CliError::remote("failed to unstage product", e))?;
    print_success("finished unstaging");
    Ok(())
}

/// `replicate-product`
pub async fn replicate(args: ReplicateProductArgs, director: &dyn DirectorGateway) -> CliResult<()> {
    let failed = |e| CliError::remote("failed to replicate product", e);
    let ReplicateProductArgs {
        product_name,
        product_version,
        replica_suffix,
    } = args;

    let replica = format!("{}-{}", product_name, replica_suffix);
    let staged = director.list_staged_products().await.map_err(failed)?;
    if staged
        .iter()
        .any(|p| p.installation_name.as_deref() == Some(replica.as_str()))
    {
        print_info(&format!(
            "{} {} with suffix {} is already staged",
            product_name, product_version, replica_suffix
        ));
        return Ok(());
    }

    let available = director.list_available_products().await.map_err(failed)?;
    if !available
        .iter()
        .any(|p| p.name == product_name && p.product_version == product_version)
    {
        return Err(CliError::NotFound(format!(
            "failed to replicate product: cannot find product {} {}",
            product_name, product_version
        )));
    }

    print_info(&format!(
        "replicating {} {} with suffix {}",
        product_name, product_version, replica_suffix
    ));
    director
        .replicate_product(&product_name, &product_version, &replica_suffix)
        .await
        .map_err(failed)?;
    print_success("finished replicating");
    Ok(())
}

/// `available-products`
pub async fn list_available(director: &dyn DirectorGateway, format: OutputFormat) -> CliResult<()> {
    let products = director.list_available_products().await?;
    output::print_output(products.into_iter().map(AvailableRow::from).collect(), format)
}

/// `staged-products`
pub async fn list_staged(director: &dyn DirectorGateway, format: OutputFormat) -> CliResult<()> {
    let products = director.list_staged_products().await?;
    output::print_output(products.into_iter().map(ProductRow::from).collect(), format)
}

/// `deployed-products`
pub async fn list_deployed(director: &dyn DirectorGateway, format: OutputFormat) -> CliResult<()> {
    let products = director.list_deployed_products().await?;
    output::print_output(products.into_iter().map(ProductRow::from).collect(), format)
}

fn latest_available(available: &[AvailableProduct], name: &str) -> Option<String> {
    available
        .iter()
        .filter(|p| p.name == name)
        .filter_map(|p| parse_lenient(&p.product_version).map(|v| (v, &p.product_version)))
        .max_by(|a, b| a.0.cmp(&b.0))
        .map(|(_, raw)| raw.clone())
}

fn file_sha256(path: &Path) -> CliResult<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeDirector;
    use om_director::{Installation, InstallationStatus};

    fn available(name: &str, version: &str) -> AvailableProduct {
        AvailableProduct {
            name: name.into(),
            product_version: version.into(),
        }
    }

    fn stage_args(name: &str, version: &str) -> StageProductArgs {
        StageProductArgs {
            product_name: name.into(),
            product_version: version.into(),
        }
    }

    #[tokio::test]
    async fn test_stage_refused_while_installing() {
        let director = FakeDirector::default();
        director.state().installations.push(Installation {
            id: 9,
            status: InstallationStatus::Running,
            user_name: None,
            started_at: None,
            finished_at: None,
        });
        director.state().available.push(available("cf", "2.0.1"));

        let err = stage(stage_args("cf", "2.0.1"), &director).await.unwrap_err();
        assert!(matches!(err, CliError::StateConflict(_)));
        assert_eq!(err.to_string(), INSTALLATION_RUNNING);
        assert!(director.state().staged_calls.is_empty());
    }

    #[tokio::test]
    async fn test_stage_skips_already_staged() {
        let director = FakeDirector::default();
        director.state().available.push(available("cf", "2.0.1"));
        director.state().staged.push(FakeDirector::staged("cf", "2.0.1"));

        stage(stage_args("cf", "2.0.1"), &director).await.unwrap();
        assert!(director.state().staged_calls.is_empty());
    }

    #[tokio::test]
    async fn test_stage_latest_available() {
        let director = FakeDirector::default();
        {
            let mut state = director.state();
            state.available.push(available("cf", "2.0.9"));
            state.available.push(available("cf", "2.0.10"));
            state.available.push(available("mysql", "9.0.0"));
        }

        stage(stage_args("cf", "latest"), &director).await.unwrap();
        assert_eq!(
            director.state().staged_calls,
            vec![("cf".to_string(), "2.0.10".to_string())]
        );
    }

    #[tokio::test]
    async fn test_stage_unknown_version() {
        let director = FakeDirector::default();
        director.state().available.push(available("cf", "2.0.1"));
        let err = stage(stage_args("cf", "3.0.0"), &director).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "failed to stage product: cannot find product cf 3.0.0"
        );
    }

    #[tokio::test]
    async fn test_unstage_prefixes_errors() {
        let director = FakeDirector::default();
        let err = unstage(
            UnstageProductArgs {
                product_name: "cf".into(),
            },
            &director,
        )
        .await
        .unwrap_err();
        assert!(err.to_string().starts_with("failed to unstage product: "));
    }

    #[tokio::test]
    async fn test_replicate_checks_availability() {
        let director = FakeDirector::default();
        director.state().available.push(available("isolation", "2.0.1"));

        let args = ReplicateProductArgs {
            product_name: "isolation".into(),
            product_version: "2.0.1".into(),
            replica_suffix: "blue".into(),
        };
        replicate(args.clone(), &director).await.unwrap();
        assert_eq!(director.state().replicated.len(), 1);

        let missing = ReplicateProductArgs {
            product_version: "1.0.0".into(),
            ..args
        };
        assert!(matches!(
            replicate(missing, &director).await.unwrap_err(),
            CliError::NotFound(_)
        ));
    }

    #[test]
    fn test_file_sha256() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tile.pivotal");
        std::fs::write(&path, b"abc").unwrap();
        assert_eq!(
            file_sha256(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
