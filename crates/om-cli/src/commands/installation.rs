//! Installation commands

use std::path::PathBuf;

use clap::Args;
use dialoguer::Confirm;
use om_config::{LoadOptions, Merger};
use om_director::{DirectorGateway, Installation};
use serde::Serialize;
use tabled::Tabled;
use tokio_util::sync::CancellationToken;

use crate::error::{CliError, CliResult};
use crate::output::{self, print_info, OutputFormat};
use crate::runner::{ApplyOptions, Runner};

/// Arguments of `apply-changes`
#[derive(Debug, Clone, Args)]
pub struct ApplyChangesArgs {
    /// Ignore verifier warnings
    #[arg(short, long)]
    pub ignore_warnings: bool,

    /// Only apply director changes
    #[arg(short, long)]
    pub skip_deploy_products: bool,

    /// Deploy only these staged products (repeatable)
    #[arg(short = 'n', long = "product-name")]
    pub product_names: Vec<String>,

    /// YAML file whose `errands` section sets errand state for this run
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Arguments of `delete-installation`
#[derive(Debug, Clone, Args)]
pub struct DeleteInstallationArgs {
    /// Do not ask for confirmation
    #[arg(short, long)]
    pub force: bool,
}

/// Arguments of `installation-log`
#[derive(Debug, Clone, Args)]
pub struct InstallationLogArgs {
    /// Installation id
    #[arg(short, long)]
    pub id: u64,
}

#[derive(Debug, Serialize, Tabled)]
struct InstallationRow {
    id: u64,
    user: String,
    status: String,
    started: String,
    finished: String,
}

impl From<Installation> for InstallationRow {
    fn from(i: Installation) -> Self {
        let stamp = |t: Option<chrono::DateTime<chrono::Utc>>| {
            t.map(|t| t.to_rfc3339()).unwrap_or_default()
        };
        Self {
            id: i.id,
            user: i.user_name.clone().unwrap_or_default(),
            status: format!("{:?}", i.status).to_lowercase(),
            started: stamp(i.started_at),
            finished: stamp(i.finished_at),
        }
    }
}

/// `apply-changes`
pub async fn apply_changes(
    args: ApplyChangesArgs,
    director: &dyn DirectorGateway,
    cancel: CancellationToken,
) -> CliResult<()> {
    let errands = match &args.config {
        Some(path) => read_errands(path)?,
        None => None,
    };
    let options = ApplyOptions {
        ignore_warnings: args.ignore_warnings,
        skip_deploy_products: args.skip_deploy_products,
        product_names: args.product_names,
        errands,
    };
    Runner::new(director, cancel, std::io::stdout(), std::io::stderr())
        .apply_changes(&options)
        .await
}

/// `delete-installation`
pub async fn delete_installation(
    args: DeleteInstallationArgs,
    director: &dyn DirectorGateway,
    cancel: CancellationToken,
) -> CliResult<()> {
    if !args.force {
        let confirmed = Confirm::new()
            .with_prompt("Do you really want to delete the installation?")
            .default(false)
            .interact()?;
        if !confirmed {
            print_info("Ok, nothing was deleted.");
            return Ok(());
        }
    }
    Runner::new(director, cancel, std::io::stdout(), std::io::stderr())
        .delete_installation()
        .await
}

/// `installations`
pub async fn list(director: &dyn DirectorGateway, format: OutputFormat) -> CliResult<()> {
    let installations = director.list_installations().await?;
    let rows: Vec<InstallationRow> = installations.into_iter().map(Into::into).collect();
    output::print_output(rows, format)
}

/// `installation-log`
pub async fn log(args: InstallationLogArgs, director: &dyn DirectorGateway) -> CliResult<()> {
    let logs = director
        .get_installation_logs(args.id)
        .await
        .map_err(|e| CliError::remote("could not retrieve installation log", e))?;
    println!("{}", logs);
    Ok(())
}

fn read_errands(path: &std::path::Path) -> CliResult<Option<serde_json::Value>> {
    let doc = Merger::new(LoadOptions::default()).load(path)?;
    match doc.get("errands") {
        Some(errands) => Ok(Some(serde_json::to_value(errands)?)),
        None => Ok(None),
    }
}
