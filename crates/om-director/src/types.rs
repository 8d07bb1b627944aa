//! Wire types of the Director API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

/// State of the Director's initial setup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    /// Never configured
    Unstarted,
    /// Authentication system still starting
    Pending,
    /// Ready for authenticated requests
    Complete,
    /// Response not recognized
    Unknown,
}

impl std::fmt::Display for Availability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unstarted => "unstarted",
            Self::Pending => "pending",
            Self::Complete => "complete",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Status of an installation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallationStatus {
    Running,
    Succeeded,
    Failed,
    #[serde(other)]
    Unknown,
}

impl InstallationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// An installation as the Director reports it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Installation {
    pub id: u64,
    pub status: InstallationStatus,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Installation {
    /// `started_at` in Unix `date` form, e.g. `Sat Feb 25 02:31:01 UTC 2017`
    pub fn started_display(&self) -> String {
        self.started_at
            .map(|t| t.format("%a %b %e %H:%M:%S UTC %Y").to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// Which products an installation deploys
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DeployProducts {
    #[default]
    All,
    None,
    /// Staged product guids
    Only(Vec<String>),
}

impl Serialize for DeployProducts {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::All => serializer.serialize_str("all"),
            Self::None => serializer.serialize_str("none"),
            Self::Only(guids) => guids.serialize(serializer),
        }
    }
}

/// Inputs to an apply-changes
#[derive(Debug, Clone, Default)]
pub struct CreateInstallation {
    pub ignore_warnings: bool,
    pub deploy_products: DeployProducts,
    /// Product names to resolve to guids; overrides `deploy_products`
    pub product_names: Vec<String>,
    /// `errands` section of an errand config, keyed by product name
    pub errands: Option<serde_json::Value>,
}

/// A product staged on the Director
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedProduct {
    pub guid: String,
    #[serde(rename = "type")]
    pub product_type: String,
    #[serde(default)]
    pub installation_name: Option<String>,
    #[serde(default)]
    pub product_version: Option<String>,
}

/// Deployed products share the staged shape
pub type DeployedProduct = StagedProduct;

/// A product uploaded but not necessarily staged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableProduct {
    pub name: String,
    pub product_version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateAuthority {
    pub guid: String,
    pub issuer: String,
    pub created_on: String,
    pub expires_on: String,
    pub active: bool,
    #[serde(default)]
    pub cert_pem: String,
}

/// An operating system and version pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stemcell {
    pub os: String,
    pub version: String,
}

impl std::fmt::Display for Stemcell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.os, self.version)
    }
}

/// Stemcells associated with one product
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProductStemcells {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub guid: String,
    #[serde(rename = "identifier", default, skip_serializing_if = "String::is_empty")]
    pub product_name: String,
    #[serde(rename = "is_staged_for_deletion", default, skip_serializing_if = "std::ops::Not::not")]
    pub staged_for_deletion: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub staged_stemcells: Vec<Stemcell>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub available_stemcells: Vec<Stemcell>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_stemcells: Vec<Stemcell>,
}

/// Body of `/api/v0/stemcell_associations`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StemcellAssociations {
    #[serde(default)]
    pub products: Vec<ProductStemcells>,
}

/// Manifest or cloud-config diff
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ManifestDiff {
    pub status: String,
    #[serde(default)]
    pub diff: String,
}

impl ManifestDiff {
    pub fn is_different(&self) -> bool {
        self.status == "different"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RuntimeConfigDiff {
    pub name: String,
    pub status: String,
    #[serde(default)]
    pub diff: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CpiConfigDiff {
    #[serde(default)]
    pub guid: String,
    #[serde(default)]
    pub iaas_configuration_name: String,
    pub status: String,
    #[serde(default)]
    pub diff: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DirectorDiff {
    pub manifest: ManifestDiff,
    #[serde(default)]
    pub cloud_config: ManifestDiff,
    #[serde(default)]
    pub runtime_configs: Vec<RuntimeConfigDiff>,
    #[serde(default)]
    pub cpi_configs: Vec<CpiConfigDiff>,
}

impl DirectorDiff {
    pub fn has_changes(&self) -> bool {
        self.manifest.is_different()
            || self.cloud_config.is_different()
            || self.runtime_configs.iter().any(|c| c.status != "same")
            || self.cpi_configs.iter().any(|c| c.status != "same")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProductDiff {
    pub manifest: ManifestDiff,
    #[serde(default)]
    pub runtime_configs: Vec<RuntimeConfigDiff>,
}

impl ProductDiff {
    pub fn has_changes(&self) -> bool {
        self.manifest.is_different() || self.runtime_configs.iter().any(|c| c.status != "same")
    }
}
