//! Installation Runner: trigger or re-attach to an installation and stream
//! its logs until it ends.

use std::io::Write;

use om_director::{CreateInstallation, DeployProducts, DirectorGateway, Installation, LogStream};
use tokio_util::sync::CancellationToken;

use crate::error::{CliError, CliResult};

/// What to ask for when a new installation has to be created
#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    pub ignore_warnings: bool,
    pub skip_deploy_products: bool,
    /// Restrict the deploy to these staged products
    pub product_names: Vec<String>,
    /// `errands` section forwarded as-is
    pub errands: Option<serde_json::Value>,
}

impl ApplyOptions {
    fn request(&self) -> CliResult<CreateInstallation> {
        if self.skip_deploy_products && !self.product_names.is_empty() {
            return Err(CliError::invalid(
                "product-name flag can not be passed with the skip-deploy-products flag",
            ));
        }
        Ok(CreateInstallation {
            ignore_warnings: self.ignore_warnings,
            deploy_products: if self.skip_deploy_products {
                DeployProducts::None
            } else {
                DeployProducts::All
            },
            product_names: self.product_names.clone(),
            errands: self.errands.clone(),
        })
    }
}

/// Drives one installation. Log lines go to `out`, status lines to `notices`.
pub struct Runner<'a, O, N> {
    director: &'a dyn DirectorGateway,
    cancel: CancellationToken,
    out: O,
    notices: N,
}

impl<'a, O: Write, N: Write> Runner<'a, O, N> {
    pub fn new(director: &'a dyn DirectorGateway, cancel: CancellationToken, out: O, notices: N) -> Self {
        Self {
            director,
            cancel,
            out,
            notices,
        }
    }

    /// Apply changes, re-attaching to a running installation if there is one.
    pub async fn apply_changes(&mut self, options: &ApplyOptions) -> CliResult<()> {
        let request = options.request()?;
        let installation = match self.running("could not check for any already running installation").await? {
            Some(running) => {
                writeln!(
                    self.notices,
                    "found already running installation...re-attaching (Installation ID: {}, Started: {})",
                    running.id,
                    running.started_display()
                )?;
                running
            }
            None => {
                let created = self
                    .director
                    .create_installation(&request)
                    .await
                    .map_err(|e| CliError::remote("installation failed to trigger", e))?;
                writeln!(self.notices, "attempting to apply changes to the targeted Ops Manager")?;
                created
            }
        };
        tracing::debug!(id = installation.id, "following installation");
        self.follow(installation.id).await
    }

    /// Delete every installation asset, or re-attach to a deletion in progress.
    pub async fn delete_installation(&mut self) -> CliResult<()> {
        let installation = match self.running("could not check for any already running installation").await? {
            Some(running) => {
                writeln!(self.notices, "found already running deletion...attempting to re-attach")?;
                running
            }
            None => {
                writeln!(
                    self.notices,
                    "attempting to delete the installation on the targeted Ops Manager"
                )?;
                let deletion = self
                    .director
                    .delete_installation_assets()
                    .await
                    .map_err(|e| CliError::remote("failed to delete installation", e))?;
                match deletion {
                    Some(deletion) => deletion,
                    None => {
                        writeln!(self.notices, "no installation to delete")?;
                        return Ok(());
                    }
                }
            }
        };
        self.follow(installation.id).await
    }

    async fn running(&self, context: &str) -> CliResult<Option<Installation>> {
        self.director
            .running_installation()
            .await
            .map_err(|e| CliError::remote(context, e))
    }

    async fn follow(&mut self, id: u64) -> CliResult<()> {
        let stream = self
            .director
            .stream_installation_logs(id)
            .await
            .map_err(|e| CliError::remote("installation failed to get logs", e))?;
        self.drain(stream).await
    }

    /// Print every line, then surface the terminal error if one was sent.
    async fn drain(&mut self, mut stream: LogStream) -> CliResult<()> {
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(CliError::Cancelled),
                line = stream.lines.recv() => match line {
                    Some(line) => writeln!(self.out, "{}", line)?,
                    None => break,
                },
            }
        }
        self.out.flush()?;
        match stream.errors.recv().await {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }
}
