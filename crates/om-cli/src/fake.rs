//! In-memory Director for command tests

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use om_artifact::ProgressSink;
use om_config::ConfigTree;
use om_director::{
    log_channel, Availability, AvailableProduct, CertificateAuthority, CreateInstallation,
    DeployedProduct, DirectorDiff, DirectorError, DirectorGateway, Installation,
    InstallationStatus, LogSender, LogStream, ProductDiff, Result, StagedProduct,
    StemcellAssociations,
};
use parking_lot::{Mutex, MutexGuard};

#[derive(Default)]
pub struct FakeState {
    /// Answers to `ensure_availability`, then `Complete` once drained
    pub availability: VecDeque<Availability>,
    pub imported: Vec<(PathBuf, String)>,

    pub installations: Vec<Installation>,
    pub created: Vec<CreateInstallation>,
    pub log_lines: Vec<String>,
    pub fail_installation: bool,
    pub hold_stream: bool,
    held: Vec<LogSender>,
    pub list_error: bool,
    pub nothing_to_delete: bool,

    pub available: Vec<AvailableProduct>,
    pub staged: Vec<StagedProduct>,
    pub deployed: Vec<DeployedProduct>,
    pub staged_calls: Vec<(String, String)>,
    pub unstaged: Vec<String>,
    pub replicated: Vec<(String, String, String)>,
    pub uploads: Vec<PathBuf>,

    pub configured: Vec<(String, ConfigTree)>,
    pub director_configured: Vec<ConfigTree>,

    pub stemcells: StemcellAssociations,
    pub assigned: Vec<StemcellAssociations>,

    pub authorities: Vec<CertificateAuthority>,
    pub activated: Vec<String>,

    pub director_diff: DirectorDiff,
    pub product_diffs: HashMap<String, ProductDiff>,
}

#[derive(Default)]
pub struct FakeDirector {
    state: Mutex<FakeState>,
}

impl FakeDirector {
    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock()
    }

    pub fn staged(name: &str, version: &str) -> StagedProduct {
        StagedProduct {
            guid: format!("{}-guid", name),
            product_type: name.to_string(),
            installation_name: None,
            product_version: Some(version.to_string()),
        }
    }
}

fn unsupported(what: &str) -> DirectorError {
    DirectorError::Unavailable(format!("{} is not faked", what))
}

#[async_trait]
impl DirectorGateway for FakeDirector {
    async fn ensure_availability(&self) -> Result<Availability> {
        Ok(self
            .state()
            .availability
            .pop_front()
            .unwrap_or(Availability::Complete))
    }

    async fn unlock(&self, _passphrase: &str) -> Result<()> {
        Ok(())
    }

    async fn list_installations(&self) -> Result<Vec<Installation>> {
        let state = self.state();
        if state.list_error {
            return Err(DirectorError::Unavailable("director is down".into()));
        }
        Ok(state.installations.clone())
    }

    async fn create_installation(&self, request: &CreateInstallation) -> Result<Installation> {
        let mut state = self.state();
        state.created.push(request.clone());
        Ok(Installation {
            id: 1,
            status: InstallationStatus::Running,
            user_name: None,
            started_at: None,
            finished_at: None,
        })
    }

    async fn get_installation(&self, id: u64) -> Result<Installation> {
        self.state()
            .installations
            .iter()
            .find(|i| i.id == id)
            .cloned()
            .ok_or_else(|| unsupported("get_installation"))
    }

    async fn get_installation_logs(&self, _id: u64) -> Result<String> {
        Ok(self.state().log_lines.join("\n"))
    }

    async fn stream_installation_logs(&self, id: u64) -> Result<LogStream> {
        let (sender, stream) = log_channel();
        let mut state = self.state();
        if state.hold_stream {
            state.held.push(sender);
            return Ok(stream);
        }
        let lines = state.log_lines.clone();
        let fail = state.fail_installation;
        tokio::spawn(async move {
            for line in lines {
                if !sender.line(line).await {
                    return;
                }
            }
            if fail {
                sender.fail(DirectorError::InstallationFailed { id });
            }
        });
        Ok(stream)
    }

    async fn delete_installation_assets(&self) -> Result<Option<Installation>> {
        if self.state().nothing_to_delete {
            return Ok(None);
        }
        Ok(Some(Installation {
            id: 2,
            status: InstallationStatus::Running,
            user_name: None,
            started_at: None,
            finished_at: None,
        }))
    }

    async fn export_installation(&self, _dest: &Path, _progress: &mut dyn ProgressSink) -> Result<u64> {
        Err(unsupported("export_installation"))
    }

    async fn import_installation(
        &self,
        archive: &Path,
        passphrase: &str,
        _progress: &mut dyn ProgressSink,
    ) -> Result<()> {
        self.state()
            .imported
            .push((archive.to_path_buf(), passphrase.to_string()));
        Ok(())
    }

    async fn upload_product(&self, tile: &Path, _progress: &mut dyn ProgressSink) -> Result<()> {
        self.state().uploads.push(tile.to_path_buf());
        Ok(())
    }

    async fn upload_stemcell(
        &self,
        stemcell: &Path,
        _floating: bool,
        _progress: &mut dyn ProgressSink,
    ) -> Result<()> {
        self.state().uploads.push(stemcell.to_path_buf());
        Ok(())
    }

    async fn list_available_products(&self) -> Result<Vec<AvailableProduct>> {
        Ok(self.state().available.clone())
    }

    async fn list_staged_products(&self) -> Result<Vec<StagedProduct>> {
        Ok(self.state().staged.clone())
    }

    async fn list_deployed_products(&self) -> Result<Vec<DeployedProduct>> {
        Ok(self.state().deployed.clone())
    }

    async fn stage_product(&self, name: &str, version: &str) -> Result<()> {
        self.state()
            .staged_calls
            .push((name.to_string(), version.to_string()));
        Ok(())
    }

    async fn unstage_product(&self, name: &str) -> Result<()> {
        let mut state = self.state();
        if !state.staged.iter().any(|p| p.product_type == name) {
            return Err(DirectorError::product_not_found(name));
        }
        state.unstaged.push(name.to_string());
        Ok(())
    }

    async fn replicate_product(&self, name: &str, version: &str, replica_suffix: &str) -> Result<()> {
        self.state().replicated.push((
            name.to_string(),
            version.to_string(),
            replica_suffix.to_string(),
        ));
        Ok(())
    }

    async fn apply_product_config(&self, guid: &str, tree: &ConfigTree) -> Result<()> {
        self.state()
            .configured
            .push((guid.to_string(), tree.clone()));
        Ok(())
    }

    async fn apply_director_config(&self, tree: &ConfigTree) -> Result<()> {
        self.state().director_configured.push(tree.clone());
        Ok(())
    }

    async fn list_multi_stemcells(&self) -> Result<StemcellAssociations> {
        Ok(self.state().stemcells.clone())
    }

    async fn assign_multi_stemcell(&self, associations: &StemcellAssociations) -> Result<()> {
        self.state().assigned.push(associations.clone());
        Ok(())
    }

    async fn list_certificate_authorities(&self) -> Result<Vec<CertificateAuthority>> {
        Ok(self.state().authorities.clone())
    }

    async fn activate_certificate_authority(&self, guid: &str) -> Result<()> {
        self.state().activated.push(guid.to_string());
        Ok(())
    }

    async fn regenerate_certificate_authorities(&self) -> Result<()> {
        Ok(())
    }

    async fn director_diff(&self) -> Result<DirectorDiff> {
        Ok(self.state().director_diff.clone())
    }

    async fn product_diff(&self, name: &str) -> Result<ProductDiff> {
        self.state()
            .product_diffs
            .get(name)
            .cloned()
            .ok_or_else(|| DirectorError::product_not_found(name))
    }
}
