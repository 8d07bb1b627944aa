//! The capability surface every subcommand talks to.

use std::path::Path;

use async_trait::async_trait;
use om_artifact::ProgressSink;
use om_config::ConfigTree;

use crate::error::Result;
use crate::logs::LogStream;
use crate::types::{
    AvailableProduct, Availability, CertificateAuthority, CreateInstallation, DeployedProduct,
    DirectorDiff, Installation, ProductDiff, StagedProduct, StemcellAssociations,
};

/// Operations against a Director.
///
/// Every `apply_*`, `assign_*` and `stage_*` call is idempotent in its
/// observable effect; every `list_*` call is a pure read.
#[async_trait]
pub trait DirectorGateway: Send + Sync {
    // ========== Health ==========

    /// Setup state, read without authenticating.
    async fn ensure_availability(&self) -> Result<Availability>;

    /// Unlock the Director after a restart, then wait for it to come up.
    async fn unlock(&self, passphrase: &str) -> Result<()>;

    // ========== Installations ==========

    /// Newest first.
    async fn list_installations(&self) -> Result<Vec<Installation>>;

    /// The first listed installation whose status is `running`.
    async fn running_installation(&self) -> Result<Option<Installation>> {
        Ok(self
            .list_installations()
            .await?
            .into_iter()
            .find(|i| i.status == crate::types::InstallationStatus::Running))
    }

    async fn create_installation(&self, request: &CreateInstallation) -> Result<Installation>;

    async fn get_installation(&self, id: u64) -> Result<Installation>;

    /// Full log text of an installation so far.
    async fn get_installation_logs(&self, id: u64) -> Result<String>;

    /// Lines of an installation as they appear, then at most one error.
    async fn stream_installation_logs(&self, id: u64) -> Result<LogStream>;

    /// `None` when there is no installation to delete.
    async fn delete_installation_assets(&self) -> Result<Option<Installation>>;

    async fn export_installation(&self, dest: &Path, progress: &mut dyn ProgressSink) -> Result<u64>;

    /// Sent without authentication; the Director is unconfigured.
    async fn import_installation(
        &self,
        archive: &Path,
        passphrase: &str,
        progress: &mut dyn ProgressSink,
    ) -> Result<()>;

    // ========== Products ==========

    async fn upload_product(&self, tile: &Path, progress: &mut dyn ProgressSink) -> Result<()>;

    async fn upload_stemcell(
        &self,
        stemcell: &Path,
        floating: bool,
        progress: &mut dyn ProgressSink,
    ) -> Result<()>;

    async fn list_available_products(&self) -> Result<Vec<AvailableProduct>>;

    async fn list_staged_products(&self) -> Result<Vec<StagedProduct>>;

    async fn list_deployed_products(&self) -> Result<Vec<DeployedProduct>>;

    /// The staged product whose type is `name`.
    async fn get_staged_product(&self, name: &str) -> Result<StagedProduct> {
        self.list_staged_products()
            .await?
            .into_iter()
            .find(|p| p.product_type == name)
            .ok_or_else(|| crate::error::DirectorError::product_not_found(name))
    }

    /// Stage `name` at `version`, upgrading it in place if already staged.
    async fn stage_product(&self, name: &str, version: &str) -> Result<()>;

    async fn unstage_product(&self, name: &str) -> Result<()>;

    /// Stage a second copy of `name` whose installation name ends in `suffix`.
    async fn replicate_product(&self, name: &str, version: &str, replica_suffix: &str) -> Result<()>;

    // ========== Configuration ==========

    async fn apply_product_config(&self, guid: &str, tree: &ConfigTree) -> Result<()>;

    async fn apply_director_config(&self, tree: &ConfigTree) -> Result<()>;

    async fn list_multi_stemcells(&self) -> Result<StemcellAssociations>;

    async fn assign_multi_stemcell(&self, associations: &StemcellAssociations) -> Result<()>;

    // ========== Certificates ==========

    async fn list_certificate_authorities(&self) -> Result<Vec<CertificateAuthority>>;

    async fn activate_certificate_authority(&self, guid: &str) -> Result<()>;

    async fn regenerate_certificate_authorities(&self) -> Result<()>;

    // ========== Diff ==========

    async fn director_diff(&self) -> Result<DirectorDiff>;

    /// Diff of the staged product whose type is `name`.
    async fn product_diff(&self, name: &str) -> Result<ProductDiff>;
}
