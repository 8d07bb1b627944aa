//! HTTP implementation of the Director gateway

use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use om_artifact::{copy_with_progress, ProgressSink};
use om_config::{ConfigTree, SectionKind};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::sync::OnceCell;
use tokio_util::io::{ReaderStream, StreamReader};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::auth::{self, Credentials};
use crate::error::{DirectorError, Result};
use crate::gateway::DirectorGateway;
use crate::logs::{self, LogStream, DEFAULT_POLL_INTERVAL};
use crate::types::{
    AvailableProduct, Availability, CertificateAuthority, CreateInstallation, DeployProducts,
    DeployedProduct, DirectorDiff, Installation, InstallationStatus, ProductDiff, StagedProduct,
    StemcellAssociations,
};

const INSTALLATIONS: &str = "/api/v0/installations";
const ASSET_COLLECTION: &str = "/api/v0/installation_asset_collection";
const STAGED_PRODUCTS: &str = "/api/v0/staged/products";
const DIRECTOR_PRODUCT: &str = "p-bosh";
const WAITING_FOR_AUTH: &str = "Waiting for authentication system to start...";
const UPLOAD_TICK: Duration = Duration::from_millis(200);

/// Connection settings for a Director
#[derive(Clone)]
pub struct DirectorOptions {
    /// URL or bare host; `https://` is assumed
    pub target: String,
    pub credentials: Option<Credentials>,
    pub skip_ssl_validation: bool,
    /// PEM bundle trusted in addition to the system roots
    pub ca_cert: Option<String>,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// Unlock the Director before the first authenticated call
    pub decryption_passphrase: Option<String>,
    pub poll_interval: Duration,
}

impl DirectorOptions {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            credentials: None,
            skip_ssl_validation: false,
            ca_cert: None,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(1800),
            decryption_passphrase: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl std::fmt::Debug for DirectorOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectorOptions")
            .field("target", &self.target)
            .field("credentials", &self.credentials)
            .field("skip_ssl_validation", &self.skip_ssl_validation)
            .field("connect_timeout", &self.connect_timeout)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

/// Parse a target, defaulting the scheme to https.
pub fn parse_target(target: &str) -> Result<Url> {
    let trimmed = target.trim();
    let invalid = |reason: String| DirectorError::InvalidTarget {
        target: target.to_string(),
        reason,
    };
    if trimmed.is_empty() {
        return Err(invalid("target flag is required. Run `om help` for more info.".into()));
    }
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };
    let url = Url::parse(&with_scheme).map_err(|e| invalid(e.to_string()))?;
    if url.host_str().is_none() {
        return Err(invalid("missing host".into()));
    }
    Ok(url)
}

struct Inner {
    http: Client,
    base: Url,
    options: DirectorOptions,
    token: OnceCell<String>,
    unlocked: OnceCell<()>,
    cancel: CancellationToken,
}

/// Director gateway over the Ops Manager v0 REST API.
///
/// Cheap to clone; clones share the token and the cancellation handle.
#[derive(Clone)]
pub struct HttpDirector {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for HttpDirector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpDirector")
            .field("target", &self.inner.base.as_str())
            .field("authenticated", &self.inner.token.initialized())
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct InstallationList {
    installations: Vec<Installation>,
}

#[derive(Deserialize)]
struct Created {
    install: CreatedId,
}

#[derive(Deserialize)]
struct CreatedId {
    id: u64,
}

#[derive(Deserialize)]
struct InstallationState {
    status: InstallationStatus,
    #[serde(default)]
    user_name: Option<String>,
    #[serde(default)]
    started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    finished_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct InstallationLogs {
    #[serde(default)]
    logs: Option<String>,
}

#[derive(Deserialize)]
struct Jobs {
    jobs: Vec<Job>,
}

#[derive(Deserialize)]
struct Job {
    name: String,
    guid: String,
}

#[derive(Deserialize)]
struct CertificateAuthorities {
    certificate_authorities: Vec<CertificateAuthority>,
}

impl HttpDirector {
    pub fn new(options: DirectorOptions) -> Result<Self> {
        Self::with_cancellation(options, CancellationToken::new())
    }

    /// Every request races `cancel`.
    pub fn with_cancellation(options: DirectorOptions, cancel: CancellationToken) -> Result<Self> {
        let base = parse_target(&options.target)?;
        let mut builder = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(options.connect_timeout)
            .timeout(options.request_timeout)
            .danger_accept_invalid_certs(options.skip_ssl_validation);
        if let Some(pem) = &options.ca_cert {
            let cert = reqwest::Certificate::from_pem(pem.as_bytes())
                .map_err(|e| DirectorError::Client(format!("invalid CA certificate: {}", e)))?;
            builder = builder.add_root_certificate(cert);
        }
        let http = builder
            .build()
            .map_err(|e| DirectorError::Client(e.to_string()))?;

        Ok(Self {
            inner: Arc::new(Inner {
                http,
                base,
                options,
                token: OnceCell::new(),
                unlocked: OnceCell::new(),
                cancel,
            }),
        })
    }

    pub fn target(&self) -> &Url {
        &self.inner.base
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.inner.cancel
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.inner
            .base
            .join(path)
            .map_err(|e| DirectorError::InvalidTarget {
                target: self.inner.base.to_string(),
                reason: e.to_string(),
            })
    }

    async fn cancellable<T>(&self, fut: impl Future<Output = T>) -> Result<T> {
        tokio::select! {
            biased;
            _ = self.inner.cancel.cancelled() => Err(DirectorError::Cancelled),
            out = fut => Ok(out),
        }
    }

    async fn bearer(&self) -> Result<String> {
        if let Some(passphrase) = &self.inner.options.decryption_passphrase {
            self.inner
                .unlocked
                .get_or_try_init(|| self.unlock(passphrase))
                .await?;
        }
        let token = self
            .inner
            .token
            .get_or_try_init(|| async {
                let credentials = self.inner.options.credentials.as_ref().ok_or_else(|| {
                    DirectorError::Authentication(
                        "set --username and --password, or --client-id and --client-secret".into(),
                    )
                })?;
                let url = auth::token_url(&self.inner.base)?;
                self.cancellable(auth::fetch_token(&self.inner.http, &url, credentials))
                    .await?
            })
            .await?;
        Ok(token.clone())
    }

    async fn send(&self, method: Method, path: &str, body: Option<&Value>, authenticated: bool) -> Result<Response> {
        let mut request = self.inner.http.request(method.clone(), self.url(path)?);
        if authenticated {
            request = request.bearer_auth(self.bearer().await?);
        }
        match body {
            Some(body) => {
                tracing::trace!(%method, path, %body, "request");
                request = request.json(body);
            }
            None => tracing::trace!(%method, path, "request"),
        }

        let response = self
            .cancellable(request.send())
            .await?
            .map_err(|source| DirectorError::Http {
                method: method.to_string(),
                path: path.to_string(),
                source,
            })?;
        tracing::trace!(%method, path, status = response.status().as_u16(), "response");
        Ok(response)
    }

    async fn expect_success(&self, method: &Method, path: &str, response: Response) -> Result<Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = self.cancellable(response.text()).await?.unwrap_or_default();
        Err(DirectorError::Api {
            method: method.to_string(),
            path: path.to_string(),
            status,
            body,
        })
    }

    async fn decode<T: DeserializeOwned>(&self, path: &str, response: Response) -> Result<T> {
        let text = self
            .cancellable(response.text())
            .await?
            .map_err(|e| DirectorError::Decode {
                path: path.to_string(),
                message: e.to_string(),
            })?;
        tracing::trace!(path, body = %text, "response body");
        serde_json::from_str(&text).map_err(|e| DirectorError::Decode {
            path: path.to_string(),
            message: e.to_string(),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: Method, path: &str, body: Option<&Value>) -> Result<T> {
        let response = self.send(method.clone(), path, body, true).await?;
        let response = self.expect_success(&method, path, response).await?;
        self.decode(path, response).await
    }

    async fn call_empty(&self, method: Method, path: &str, body: Option<&Value>) -> Result<()> {
        let response = self.send(method.clone(), path, body, true).await?;
        self.expect_success(&method, path, response).await?;
        Ok(())
    }

    async fn wait_until_available(&self) -> Result<()> {
        let mut announced = false;
        loop {
            match self.ensure_availability().await? {
                Availability::Complete => return Ok(()),
                Availability::Unstarted => {
                    return Err(DirectorError::Unavailable(
                        "the director has not been configured yet".into(),
                    ))
                }
                Availability::Pending | Availability::Unknown => {}
            }
            if !announced {
                tracing::info!("waiting for the director's auth systems to start");
                announced = true;
            }
            self.cancellable(tokio::time::sleep(self.inner.options.poll_interval))
                .await?;
        }
    }

    async fn file_part(path: &Path, sent: Arc<AtomicU64>) -> Result<(Part, u64)> {
        let file = tokio::fs::File::open(path).await?;
        let size = file.metadata().await?.len();
        let stream = ReaderStream::new(file).inspect_ok(move |chunk| {
            sent.fetch_add(chunk.len() as u64, Ordering::Relaxed);
        });
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let part = Part::stream_with_length(reqwest::Body::wrap_stream(stream), size).file_name(name);
        Ok((part, size))
    }

    /// POST a multipart form, reporting bytes as the body is consumed.
    async fn upload(
        &self,
        path: &str,
        form: Form,
        sent: Arc<AtomicU64>,
        total: u64,
        authenticated: bool,
        progress: &mut dyn ProgressSink,
    ) -> Result<()> {
        let mut request = self.inner.http.post(self.url(path)?).multipart(form);
        if authenticated {
            request = request.bearer_auth(self.bearer().await?);
        }
        tracing::trace!(path, total, "multipart upload");

        progress.set_total(total);
        let send = request.send();
        tokio::pin!(send);
        let mut ticker = tokio::time::interval(UPLOAD_TICK);
        let mut reported = 0u64;
        let result = loop {
            tokio::select! {
                _ = self.inner.cancel.cancelled() => return Err(DirectorError::Cancelled),
                result = &mut send => break result,
                _ = ticker.tick() => {
                    let now = sent.load(Ordering::Relaxed);
                    if now > reported {
                        progress.advance(now - reported);
                        reported = now;
                    }
                }
            }
        };
        let now = sent.load(Ordering::Relaxed);
        if now > reported {
            progress.advance(now - reported);
        }

        let response = result.map_err(|source| DirectorError::Http {
            method: "POST".to_string(),
            path: path.to_string(),
            source,
        })?;
        self.expect_success(&Method::POST, path, response).await?;
        progress.finish();
        Ok(())
    }

    async fn apply_resource_config(&self, guid: &str, value: &serde_yaml::Value) -> Result<()> {
        let section = SectionKind::ResourceConfig;
        let Value::Object(entries) = section_json(section, value)? else {
            return Err(DirectorError::Config {
                section: section.key().to_string(),
                message: "expected a mapping of job names".into(),
            });
        };
        let base = format!("{}/{}", STAGED_PRODUCTS, guid);
        let jobs: Jobs = self.call(Method::GET, &format!("{}/jobs", base), None).await?;

        let mut max_in_flight = Map::new();
        for (name, mut properties) in entries {
            let job = jobs
                .jobs
                .iter()
                .find(|j| j.name == name)
                .ok_or_else(|| DirectorError::NotFound {
                    kind: "job",
                    name: name.clone(),
                })?;
            if let Value::Object(map) = &mut properties {
                if let Some(limit) = map.remove("max_in_flight") {
                    max_in_flight.insert(job.guid.clone(), limit);
                }
            }
            let Value::Object(changes) = properties else {
                continue;
            };
            if changes.is_empty() {
                continue;
            }

            let path = format!("{}/jobs/{}/resource_config", base, job.guid);
            let mut current: Value = self.call(Method::GET, &path, None).await?;
            if let Value::Object(current) = &mut current {
                current.extend(changes);
            }
            tracing::info!(job = %name, "applying resource configuration");
            self.call_empty(Method::PUT, &path, Some(&current)).await?;
        }

        if !max_in_flight.is_empty() {
            tracing::info!("applying max in flight");
            self.call_empty(
                Method::PUT,
                &format!("{}/max_in_flight", base),
                Some(&json!({ "max_in_flight": max_in_flight })),
            )
            .await?;
        }
        Ok(())
    }

    async fn apply_errand_config(&self, guid: &str, value: &serde_yaml::Value) -> Result<()> {
        let section = SectionKind::ErrandConfig;
        let Value::Object(entries) = section_json(section, value)? else {
            return Err(DirectorError::Config {
                section: section.key().to_string(),
                message: "expected a mapping of errand names".into(),
            });
        };
        let errands: Vec<Value> = entries
            .into_iter()
            .map(|(name, config)| {
                let mut errand = json!({ "name": name });
                if let Value::Object(config) = config {
                    if let Some(v) = config.get("post-deploy") {
                        errand["post_deploy"] = v.clone();
                    }
                    if let Some(v) = config.get("pre-delete") {
                        errand["pre_delete"] = v.clone();
                    }
                }
                errand
            })
            .collect();
        tracing::info!(count = errands.len(), "applying errand configuration");
        self.call_empty(
            Method::PUT,
            &format!("{}/{}/errands", STAGED_PRODUCTS, guid),
            Some(&json!({ "errands": errands })),
        )
        .await
    }
}

fn section_json(kind: SectionKind, value: &serde_yaml::Value) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| DirectorError::Config {
        section: kind.key().to_string(),
        message: e.to_string(),
    })
}

fn created(install: Created) -> Installation {
    Installation {
        id: install.install.id,
        status: InstallationStatus::Running,
        user_name: None,
        started_at: None,
        finished_at: None,
    }
}

#[async_trait]
impl DirectorGateway for HttpDirector {
    async fn ensure_availability(&self) -> Result<Availability> {
        let response = self
            .send(Method::GET, "/login/ensure_availability", None, false)
            .await?;
        let status = response.status();
        if status.is_redirection() {
            let location = response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            return Ok(if location.contains("/setup") {
                Availability::Unstarted
            } else if location.contains("/auth/cloudfoundry") {
                Availability::Complete
            } else {
                Availability::Unknown
            });
        }
        if status == StatusCode::OK {
            let body = self.cancellable(response.text()).await?.unwrap_or_default();
            if body.contains(WAITING_FOR_AUTH) {
                return Ok(Availability::Pending);
            }
        }
        Ok(Availability::Unknown)
    }

    async fn unlock(&self, passphrase: &str) -> Result<()> {
        let path = "/api/v0/unlock";
        let body = json!({ "passphrase": passphrase });
        let mut attempt = 0;
        let response = loop {
            attempt += 1;
            match self.send(Method::PUT, path, Some(&body), false).await {
                Ok(response) => break response,
                Err(DirectorError::Http { source, .. }) if source.is_timeout() && attempt < 3 => {
                    tracing::debug!(attempt, "unlock timed out, retrying");
                }
                Err(err) => return Err(err.context("could not make api request to unlock endpoint")),
            }
        };
        if response.status() != StatusCode::OK {
            return Err(DirectorError::Unavailable(
                "could not unlock ops manager, check if the decryption passphrase is correct".into(),
            ));
        }
        self.wait_until_available().await
    }

    async fn list_installations(&self) -> Result<Vec<Installation>> {
        let list: InstallationList = self.call(Method::GET, INSTALLATIONS, None).await?;
        Ok(list.installations)
    }

    async fn create_installation(&self, request: &CreateInstallation) -> Result<Installation> {
        let deploy = if request.product_names.is_empty() {
            request.deploy_products.clone()
        } else {
            let staged = self.list_staged_products().await?;
            let guids = request
                .product_names
                .iter()
                .map(|name| {
                    staged
                        .iter()
                        .find(|p| &p.product_type == name)
                        .map(|p| p.guid.clone())
                        .ok_or_else(|| DirectorError::product_not_found(name.as_str()))
                })
                .collect::<Result<Vec<_>>>()?;
            DeployProducts::Only(guids)
        };

        let mut body = json!({
            "ignore_warnings": request.ignore_warnings.to_string(),
            "deploy_products": deploy,
        });
        if let Some(errands) = &request.errands {
            body["errands"] = errands.clone();
        }
        let install: Created = self.call(Method::POST, INSTALLATIONS, Some(&body)).await?;
        Ok(created(install))
    }

    async fn get_installation(&self, id: u64) -> Result<Installation> {
        let state: InstallationState = self
            .call(Method::GET, &format!("{}/{}", INSTALLATIONS, id), None)
            .await?;
        Ok(Installation {
            id,
            status: state.status,
            user_name: state.user_name,
            started_at: state.started_at,
            finished_at: state.finished_at,
        })
    }

    async fn get_installation_logs(&self, id: u64) -> Result<String> {
        let logs: InstallationLogs = self
            .call(Method::GET, &format!("{}/{}/logs", INSTALLATIONS, id), None)
            .await?;
        Ok(logs.logs.unwrap_or_default())
    }

    async fn stream_installation_logs(&self, id: u64) -> Result<LogStream> {
        Ok(logs::poll_installation(
            Arc::new(self.clone()),
            id,
            self.inner.options.poll_interval,
            self.inner.cancel.child_token(),
        ))
    }

    async fn delete_installation_assets(&self) -> Result<Option<Installation>> {
        let method = Method::DELETE;
        let response = self
            .send(method.clone(), ASSET_COLLECTION, Some(&json!({ "errands": {} })), true)
            .await?;
        if response.status() == StatusCode::GONE {
            return Ok(None);
        }
        let response = self.expect_success(&method, ASSET_COLLECTION, response).await?;
        let install: Created = self.decode(ASSET_COLLECTION, response).await?;
        Ok(Some(created(install)))
    }

    async fn export_installation(&self, dest: &Path, progress: &mut dyn ProgressSink) -> Result<u64> {
        let response = self.send(Method::GET, ASSET_COLLECTION, None, true).await?;
        let response = self
            .expect_success(&Method::GET, ASSET_COLLECTION, response)
            .await?;
        let expected = response.content_length();
        let body = response
            .bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));
        let mut reader = StreamReader::new(Box::pin(body));
        let mut file = tokio::fs::File::create(dest).await?;

        let copied = self
            .cancellable(copy_with_progress(&mut reader, &mut file, expected, progress))
            .await??;
        if let Some(expected) = expected {
            if copied != expected {
                return Err(DirectorError::Length {
                    expected,
                    received: copied,
                });
            }
        }
        progress.finish();
        Ok(copied)
    }

    async fn import_installation(
        &self,
        archive: &Path,
        passphrase: &str,
        progress: &mut dyn ProgressSink,
    ) -> Result<()> {
        let sent = Arc::new(AtomicU64::new(0));
        let (part, size) = Self::file_part(archive, sent.clone()).await?;
        let form = Form::new()
            .part("installation[file]", part)
            .text("passphrase", passphrase.to_string());
        self.upload(ASSET_COLLECTION, form, sent, size, false, progress)
            .await
    }

    async fn upload_product(&self, tile: &Path, progress: &mut dyn ProgressSink) -> Result<()> {
        let sent = Arc::new(AtomicU64::new(0));
        let (part, size) = Self::file_part(tile, sent.clone()).await?;
        let form = Form::new().part("product[file]", part);
        self.upload("/api/v0/available_products", form, sent, size, true, progress)
            .await
    }

    async fn upload_stemcell(
        &self,
        stemcell: &Path,
        floating: bool,
        progress: &mut dyn ProgressSink,
    ) -> Result<()> {
        let sent = Arc::new(AtomicU64::new(0));
        let (part, size) = Self::file_part(stemcell, sent.clone()).await?;
        let form = Form::new()
            .part("stemcell[file]", part)
            .text("stemcell[floating]", floating.to_string());
        self.upload("/api/v0/stemcells", form, sent, size, true, progress)
            .await
    }

    async fn list_available_products(&self) -> Result<Vec<AvailableProduct>> {
        self.call(Method::GET, "/api/v0/available_products", None).await
    }

    async fn list_staged_products(&self) -> Result<Vec<StagedProduct>> {
        self.call(Method::GET, STAGED_PRODUCTS, None).await
    }

    async fn list_deployed_products(&self) -> Result<Vec<DeployedProduct>> {
        self.call(Method::GET, "/api/v0/deployed/products", None).await
    }

    async fn stage_product(&self, name: &str, version: &str) -> Result<()> {
        let staged = self.list_staged_products().await?;
        match staged.iter().find(|p| p.product_type == name) {
            Some(existing) => {
                tracing::info!(product = name, from = ?existing.product_version, to = version, "upgrading staged product");
                self.call_empty(
                    Method::PUT,
                    &format!("{}/{}", STAGED_PRODUCTS, existing.guid),
                    Some(&json!({ "to_version": version })),
                )
                .await
            }
            None => {
                self.call_empty(
                    Method::POST,
                    STAGED_PRODUCTS,
                    Some(&json!({ "name": name, "product_version": version })),
                )
                .await
            }
        }
    }

    async fn unstage_product(&self, name: &str) -> Result<()> {
        let staged = self.get_staged_product(name).await?;
        self.call_empty(
            Method::DELETE,
            &format!("{}/{}", STAGED_PRODUCTS, staged.guid),
            Some(&json!({})),
        )
        .await
    }

    async fn replicate_product(&self, name: &str, version: &str, replica_suffix: &str) -> Result<()> {
        self.call_empty(
            Method::POST,
            STAGED_PRODUCTS,
            Some(&json!({
                "name": name,
                "product_version": version,
                "replicate": true,
                "replica_suffix": replica_suffix,
            })),
        )
        .await
    }

    async fn apply_product_config(&self, guid: &str, tree: &ConfigTree) -> Result<()> {
        let base = format!("{}/{}", STAGED_PRODUCTS, guid);
        let wrapped = [
            (SectionKind::ProductProperties, "properties", "properties"),
            (SectionKind::NetworkProperties, "networks_and_azs", "networks_and_azs"),
            (SectionKind::SyslogConfiguration, "syslog_configuration", "syslog_configuration"),
        ];
        for (kind, endpoint, wrapper) in wrapped {
            if let Some(value) = tree.get(kind) {
                tracing::info!(section = %kind, "applying product configuration");
                let mut body = Map::new();
                body.insert(wrapper.to_string(), section_json(kind, value)?);
                self.call_empty(
                    Method::PUT,
                    &format!("{}/{}", base, endpoint),
                    Some(&Value::Object(body)),
                )
                .await?;
            }
        }
        if let Some(value) = tree.get(SectionKind::ResourceConfig) {
            self.apply_resource_config(guid, value).await?;
        }
        if let Some(value) = tree.get(SectionKind::ErrandConfig) {
            self.apply_errand_config(guid, value).await?;
        }
        Ok(())
    }

    async fn apply_director_config(&self, tree: &ConfigTree) -> Result<()> {
        let properties = [
            (SectionKind::DirectorConfiguration, "director_configuration"),
            (SectionKind::IaasConfiguration, "iaas_configuration"),
            (SectionKind::SecurityConfiguration, "security_configuration"),
            (SectionKind::SyslogConfiguration, "syslog_configuration"),
        ];
        let mut body = Map::new();
        for (kind, key) in properties {
            if let Some(value) = tree.get(kind) {
                body.insert(key.to_string(), section_json(kind, value)?);
            }
        }
        if !body.is_empty() {
            tracing::info!("applying director properties");
            self.call_empty(
                Method::PUT,
                "/api/v0/staged/director/properties",
                Some(&Value::Object(body)),
            )
            .await?;
        }

        if let Some(value) = tree.get(SectionKind::AzConfiguration) {
            tracing::info!("applying availability zones");
            let azs = section_json(SectionKind::AzConfiguration, value)?;
            self.call_empty(
                Method::PUT,
                "/api/v0/staged/director/availability_zones",
                Some(&json!({ "availability_zones": azs })),
            )
            .await?;
        }
        if let Some(value) = tree.get(SectionKind::NetworksConfiguration) {
            tracing::info!("applying networks");
            let networks = section_json(SectionKind::NetworksConfiguration, value)?;
            self.call_empty(Method::PUT, "/api/v0/staged/director/networks", Some(&networks))
                .await?;
        }
        if let Some(value) = tree.get(SectionKind::NetworkAssignment) {
            tracing::info!("applying network assignment");
            let assignment = section_json(SectionKind::NetworkAssignment, value)?;
            self.call_empty(
                Method::PUT,
                "/api/v0/staged/director/network_and_az",
                Some(&json!({ "network_and_az": assignment })),
            )
            .await?;
        }
        if let Some(value) = tree.get(SectionKind::ResourceConfig) {
            let director = self.get_staged_product(DIRECTOR_PRODUCT).await?;
            self.apply_resource_config(&director.guid, value).await?;
        }
        Ok(())
    }

    async fn list_multi_stemcells(&self) -> Result<StemcellAssociations> {
        self.call(Method::GET, "/api/v0/stemcell_associations", None)
            .await
    }

    async fn assign_multi_stemcell(&self, associations: &StemcellAssociations) -> Result<()> {
        let body = serde_json::to_value(associations)?;
        self.call_empty(Method::PATCH, "/api/v0/stemcell_associations", Some(&body))
            .await
    }

    async fn list_certificate_authorities(&self) -> Result<Vec<CertificateAuthority>> {
        let cas: CertificateAuthorities = self
            .call(Method::GET, "/api/v0/certificate_authorities", None)
            .await?;
        Ok(cas.certificate_authorities)
    }

    async fn activate_certificate_authority(&self, guid: &str) -> Result<()> {
        self.call_empty(
            Method::POST,
            &format!("/api/v0/certificate_authorities/{}/activate", guid),
            Some(&json!({})),
        )
        .await
    }

    async fn regenerate_certificate_authorities(&self) -> Result<()> {
        self.call_empty(
            Method::POST,
            "/api/v0/certificate_authorities/active/regenerate",
            Some(&json!({})),
        )
        .await
    }

    async fn director_diff(&self) -> Result<DirectorDiff> {
        self.call(Method::GET, "/api/v0/director/diff", None)
            .await
            .map_err(|e| e.context("could not retrieve director diff"))
    }

    async fn product_diff(&self, name: &str) -> Result<ProductDiff> {
        let staged = self.get_staged_product(name).await?;
        self.call(Method::GET, &format!("/api/v0/products/{}/diff", staged.guid), None)
            .await
            .map_err(|e| e.context("could not retrieve product diff"))
    }
}
