//! om - command-line automation for the Ops Manager Director
//!
//! Operators use it to:
//! - Upload, stage and configure products and stemcells
//! - Apply changes and follow installation logs
//! - Interpolate configuration files with variables and overlays
//! - Swap releases inside tiles and download artifacts
//! - Inspect pending manifest diffs

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use om_director::HttpDirector;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;
mod error;
#[cfg(test)]
mod fake;
mod output;
mod progress;
mod runner;

use commands::{certificates, configure, diff, download, export, installation, product, stemcell, tile};
use config::{GlobalArgs, GlobalOptions};
use error::CliResult;
use output::OutputFormat;

/// om CLI application
#[derive(Parser)]
#[command(name = "om")]
#[command(about = "om - automation for the Ops Manager director", long_about = None)]
#[command(version)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    /// Output format of listing commands (table, json, yaml)
    #[arg(long, global = true, default_value = "table")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Trigger an installation, or re-attach to a running one, and stream its logs
    ApplyChanges(installation::ApplyChangesArgs),

    /// Delete every product and the director
    DeleteInstallation(installation::DeleteInstallationArgs),

    /// List recent installations
    Installations,

    /// Print the full log of one installation
    InstallationLog(installation::InstallationLogArgs),

    /// Export the installation to a file
    ExportInstallation(export::ExportInstallationArgs),

    /// Import an installation into an unconfigured Ops Manager
    ImportInstallation(export::ImportInstallationArgs),

    /// Upload a tile
    UploadProduct(product::UploadProductArgs),

    /// Stage an uploaded product
    StageProduct(product::StageProductArgs),

    /// Unstage a product
    UnstageProduct(product::UnstageProductArgs),

    /// Stage a copy of a replicable product
    ReplicateProduct(product::ReplicateProductArgs),

    /// List uploaded products
    AvailableProducts,

    /// List staged products
    StagedProducts,

    /// List deployed products
    DeployedProducts,

    /// Configure a staged product from a config file
    ConfigureProduct(configure::ConfigureProductArgs),

    /// Configure the director from a config file
    ConfigureDirector(configure::ConfigureDirectorArgs),

    /// Render a config file with variables and ops files applied
    Interpolate(configure::InterpolateArgs),

    /// Upload a stemcell
    UploadStemcell(stemcell::UploadStemcellArgs),

    /// Assign stemcells to a product
    AssignMultiStemcell(stemcell::AssignMultiStemcellArgs),

    /// List certificate authorities
    CertificateAuthorities,

    /// Activate a certificate authority
    ActivateCertificateAuthority(certificates::ActivateCertificateAuthorityArgs),

    /// Regenerate certificates signed by the active authority
    RegenerateCertificates,

    /// Show staged versus deployed manifest differences
    ProductDiff(diff::ProductDiffArgs),

    /// Replace a release inside a tile
    ReplaceRelease(tile::ReplaceReleaseArgs),

    /// Print a tile's manifest, name or version
    TileMetadata(tile::TileMetadataArgs),

    /// Download a product from an artifact catalog
    DownloadProduct(download::DownloadProductArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            output::print_error(&err.to_string());
            ExitCode::from(err.exit_code())
        }
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    let options = GlobalOptions::resolve(cli.global)?;

    // Initialize tracing
    let filter = if options.trace { "warn,om_director=trace" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .without_time(),
        )
        .init();

    match cli.command {
        Commands::Interpolate(args) => configure::interpolate(args),
        Commands::ReplaceRelease(args) => tile::replace_release(args),
        Commands::TileMetadata(args) => tile::tile_metadata(args),
        Commands::DownloadProduct(args) => download::download_product(args).await,
        remote => run_remote(remote, &options, cli.format).await,
    }
}

async fn run_remote(command: Commands, options: &GlobalOptions, format: OutputFormat) -> CliResult<()> {
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::debug!("interrupt received");
            on_interrupt.cancel();
        }
    });

    let client = HttpDirector::with_cancellation(options.director_options()?, cancel.clone())?;
    let director = &client;

    match command {
        Commands::ApplyChanges(args) => installation::apply_changes(args, director, cancel).await,
        Commands::DeleteInstallation(args) => installation::delete_installation(args, director, cancel).await,
        Commands::Installations => installation::list(director, format).await,
        Commands::InstallationLog(args) => installation::log(args, director).await,
        Commands::ExportInstallation(args) => export::export(args, director).await,
        Commands::ImportInstallation(args) => {
            export::import(args, director, options.decryption_passphrase.as_deref()).await
        }
        Commands::UploadProduct(args) => product::upload(args, director).await,
        Commands::StageProduct(args) => product::stage(args, director).await,
        Commands::UnstageProduct(args) => product::unstage(args, director).await,
        Commands::ReplicateProduct(args) => product::replicate(args, director).await,
        Commands::AvailableProducts => product::list_available(director, format).await,
        Commands::StagedProducts => product::list_staged(director, format).await,
        Commands::DeployedProducts => product::list_deployed(director, format).await,
        Commands::ConfigureProduct(args) => configure::configure_product(args, director).await,
        Commands::ConfigureDirector(args) => configure::configure_director(args, director).await,
        Commands::UploadStemcell(args) => stemcell::upload(args, director).await,
        Commands::AssignMultiStemcell(args) => stemcell::assign_multi(args, director).await,
        Commands::CertificateAuthorities => certificates::list(director, format).await,
        Commands::ActivateCertificateAuthority(args) => certificates::activate(args, director).await,
        Commands::RegenerateCertificates => certificates::regenerate(director).await,
        Commands::ProductDiff(args) => diff::product_diff(args, director).await,
        // Local commands are dispatched by `run`
        Commands::Interpolate(_)
        | Commands::ReplaceRelease(_)
        | Commands::TileMetadata(_)
        | Commands::DownloadProduct(_) => Ok(()),
    }
}
