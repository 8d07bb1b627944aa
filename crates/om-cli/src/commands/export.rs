//! `export-installation` and `import-installation`

use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Args;
use om_director::{Availability, DirectorError, DirectorGateway};

use crate::error::{CliError, CliResult};
use crate::output::{print_info, print_success};
use crate::progress::{spinner, BarProgress};

/// Entry every exported installation carries
const INSTALLATION_ENTRY: &str = "installation.yml";

/// Failed availability checks tolerated while the web server restarts
const MAX_RETRIES: u32 = 3;

/// Arguments of `export-installation`
#[derive(Debug, Clone, Args)]
pub struct ExportInstallationArgs {
    /// Where to write the installation archive
    #[arg(short, long)]
    pub output_file: PathBuf,
}

/// Arguments of `import-installation`
#[derive(Debug, Clone, Args)]
pub struct ImportInstallationArgs {
    /// Installation archive produced by `export-installation`
    #[arg(short, long)]
    pub installation: PathBuf,

    /// Seconds between availability checks while the import runs
    #[arg(long, default_value_t = 10)]
    pub polling_interval: u64,
}

/// `export-installation`
pub async fn export(args: ExportInstallationArgs, director: &dyn DirectorGateway) -> CliResult<()> {
    print_info("exporting installation");
    let mut progress = BarProgress::new("installation");
    let written = director
        .export_installation(&args.output_file, &mut progress)
        .await
        .map_err(|e| CliError::remote("failed to export installation", e))?;
    print_success(&format!(
        "finished exporting installation ({} bytes to {})",
        written,
        args.output_file.display()
    ));
    Ok(())
}

/// `import-installation`
pub async fn import(
    args: ImportInstallationArgs,
    director: &dyn DirectorGateway,
    passphrase: Option<&str>,
) -> CliResult<()> {
    let passphrase = passphrase
        .filter(|p| !p.is_empty())
        .ok_or_else(|| {
            CliError::invalid("the global decryption-passphrase argument is required for this command")
        })?;
    validate_archive(&args.installation)?;

    let status = director
        .ensure_availability()
        .await
        .map_err(|e| CliError::remote("could not check Ops Manager status", e))?;
    if status != Availability::Unstarted {
        print_info("Ops Manager is already configured");
        return Ok(());
    }

    print_info("beginning installation import to Ops Manager");
    let mut progress = BarProgress::new("installation");
    director
        .import_installation(&args.installation, passphrase, &mut progress)
        .await
        .map_err(|e| CliError::remote("failed to import installation", e))?;

    print_info("waiting for import to complete, this should take only a couple minutes...");
    wait_until_complete(director, Duration::from_secs(args.polling_interval)).await?;
    print_success("finished import");
    Ok(())
}

async fn wait_until_complete(director: &dyn DirectorGateway, interval: Duration) -> CliResult<()> {
    let waiting = spinner("waiting for Ops Manager");
    let mut retries = 0;
    let outcome = loop {
        tokio::time::sleep(interval).await;
        match director.ensure_availability().await {
            Ok(Availability::Complete) => break Ok(()),
            Ok(status) => {
                tracing::debug!(%status, "import still running");
            }
            Err(err) if retries < MAX_RETRIES && might_resolve(&err) => {
                retries += 1;
                waiting.set_message("waiting for ops manager web server boots up...");
                tracing::debug!(error = %err, retries, "availability check failed");
            }
            Err(err) => break Err(CliError::remote("could not check Ops Manager Status", err)),
        }
    };
    waiting.finish_and_clear();
    outcome
}

/// Connection failures and gateway errors while the web server restarts.
fn might_resolve(err: &DirectorError) -> bool {
    match err {
        DirectorError::Http { .. } => true,
        _ => matches!(err.status(), Some(502) | Some(503)),
    }
}

fn validate_archive(path: &Path) -> CliResult<()> {
    let file = File::open(path).map_err(|_| {
        CliError::invalid(format!(
            "file: \"{}\" does not exist. Please check the name and try again.",
            path.display()
        ))
    })?;
    let archive = zip::ZipArchive::new(file).map_err(|_| {
        CliError::invalid(format!("file: \"{}\" is not a valid zip file", path.display()))
    })?;
    if !archive.file_names().any(|name| name == INSTALLATION_ENTRY) {
        return Err(CliError::invalid(format!(
            "file: \"{}\" is not a valid installation file. Validate that the provided installation file is correct, or run \"om export-installation\" and try again.",
            path.display()
        )));
    }
    Ok(())
}
