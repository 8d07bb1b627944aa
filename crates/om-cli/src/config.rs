//! Global connection settings: flags, `OM_*` variables and the `--env` file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Args;
use om_config::{LoadOptions, Merger};
use om_director::{Credentials, DirectorOptions};
use serde::Deserialize;

use crate::error::{CliError, CliResult};

/// Variable naming the default `--vars-env` prefix
pub const VARS_ENV_VAR: &str = "OM_VARS_ENV";

const DEFAULT_CONNECT_TIMEOUT: u64 = 10;
const DEFAULT_REQUEST_TIMEOUT: u64 = 1800;

/// Flags shared by every subcommand
#[derive(Debug, Clone, Default, Args)]
pub struct GlobalArgs {
    /// Ops Manager URL
    #[arg(short, long, env = "OM_TARGET", global = true)]
    pub target: Option<String>,

    /// Admin username
    #[arg(short, long, env = "OM_USERNAME", global = true)]
    pub username: Option<String>,

    /// Admin password
    #[arg(short, long, env = "OM_PASSWORD", global = true, hide_env_values = true)]
    pub password: Option<String>,

    /// Client id for the client-credentials grant
    #[arg(long, env = "OM_CLIENT_ID", global = true)]
    pub client_id: Option<String>,

    /// Client secret for the client-credentials grant
    #[arg(long, env = "OM_CLIENT_SECRET", global = true, hide_env_values = true)]
    pub client_secret: Option<String>,

    /// Skip TLS certificate verification
    #[arg(short = 'k', long, env = "OM_SKIP_SSL_VALIDATION", global = true)]
    pub skip_ssl_validation: bool,

    /// PEM bundle, or a path to one, trusted for the target
    #[arg(long, env = "OM_CA_CERT", global = true)]
    pub ca_cert: Option<String>,

    /// Unlock the Director with this passphrase when it has restarted
    #[arg(short, long, env = "OM_DECRYPTION_PASSPHRASE", global = true, hide_env_values = true)]
    pub decryption_passphrase: Option<String>,

    /// Seconds allowed to establish a connection
    #[arg(long, env = "OM_CONNECT_TIMEOUT", global = true)]
    pub connect_timeout: Option<u64>,

    /// Seconds allowed for a whole request
    #[arg(long, env = "OM_REQUEST_TIMEOUT", global = true)]
    pub request_timeout: Option<u64>,

    /// Log every API request and response to stderr
    #[arg(long, env = "OM_TRACE", global = true)]
    pub trace: bool,

    /// YAML file holding any of these settings in kebab-case
    #[arg(short, long, env = "OM_ENV", global = true)]
    pub env: Option<PathBuf>,
}

/// Contents of an `--env` file
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct EnvFile {
    pub target: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub skip_ssl_validation: Option<bool>,
    pub ca_cert: Option<String>,
    pub decryption_passphrase: Option<String>,
    pub connect_timeout: Option<u64>,
    pub request_timeout: Option<u64>,
    pub trace: Option<bool>,
}

impl EnvFile {
    /// Read and interpolate an env file. Unknown keys are rejected.
    pub fn load(path: &Path, vars_env: Option<&str>) -> CliResult<Self> {
        let mut options = LoadOptions::default();
        if let Some(prefix) = vars_env {
            options = options.with_var_env_prefix(prefix);
        }
        let value = Merger::new(options).load(path)?;
        Self::from_value(path, value)
    }

    fn from_value(path: &Path, value: serde_yaml::Value) -> CliResult<Self> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_yaml::from_value(value).map_err(|e| {
            CliError::invalid(format!("could not parse env file {}: {}", path.display(), e))
        })
    }
}

/// Resolved global settings; flags and `OM_*` values win over the env file.
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    pub target: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub skip_ssl_validation: bool,
    pub ca_cert: Option<String>,
    pub decryption_passphrase: Option<String>,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub trace: bool,
}

impl GlobalOptions {
    pub fn resolve(args: GlobalArgs) -> CliResult<Self> {
        let file = match &args.env {
            Some(path) => EnvFile::load(path, default_vars_env().as_deref())?,
            None => EnvFile::default(),
        };
        Ok(Self::merge(args, file))
    }

    fn merge(args: GlobalArgs, file: EnvFile) -> Self {
        Self {
            target: args.target.or(file.target),
            username: args.username.or(file.username),
            password: args.password.or(file.password),
            client_id: args.client_id.or(file.client_id),
            client_secret: args.client_secret.or(file.client_secret),
            skip_ssl_validation: args.skip_ssl_validation || file.skip_ssl_validation.unwrap_or(false),
            ca_cert: args.ca_cert.or(file.ca_cert),
            decryption_passphrase: args.decryption_passphrase.or(file.decryption_passphrase),
            connect_timeout: Duration::from_secs(
                args.connect_timeout
                    .or(file.connect_timeout)
                    .unwrap_or(DEFAULT_CONNECT_TIMEOUT),
            ),
            request_timeout: Duration::from_secs(
                args.request_timeout
                    .or(file.request_timeout)
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT),
            ),
            trace: args.trace || file.trace.unwrap_or(false),
        }
    }

    /// Connection settings for the Director client.
    pub fn director_options(&self) -> CliResult<DirectorOptions> {
        let target = self
            .target
            .clone()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| CliError::invalid("target flag is required. Run `om help` for more info."))?;

        let mut options = DirectorOptions::new(target);
        options.credentials = Credentials::from_parts(
            self.username.clone(),
            self.password.clone(),
            self.client_id.clone(),
            self.client_secret.clone(),
        );
        options.skip_ssl_validation = self.skip_ssl_validation;
        options.ca_cert = self.ca_cert.as_deref().map(read_ca_cert).transpose()?;
        options.decryption_passphrase = self.decryption_passphrase.clone();
        options.connect_timeout = self.connect_timeout;
        options.request_timeout = self.request_timeout;
        Ok(options)
    }
}

/// Prefix from `OM_VARS_ENV`, used when no `--vars-env` is given.
pub fn default_vars_env() -> Option<String> {
    std::env::var(VARS_ENV_VAR).ok().filter(|v| !v.is_empty())
}

fn read_ca_cert(value: &str) -> CliResult<String> {
    if value.contains("-----BEGIN") {
        return Ok(value.to_string());
    }
    std::fs::read_to_string(value)
        .map_err(|e| CliError::invalid(format!("could not read ca-cert file {}: {}", value, e)))
}
