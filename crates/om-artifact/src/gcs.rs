//! A Google Cloud Storage bucket as a catalog, over the JSON API.

use async_trait::async_trait;
use futures_util::TryStreamExt;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use tokio_util::io::StreamReader;
use url::Url;

use crate::error::{ArtifactError, Result};
use crate::source::{ArtifactReader, ArtifactSource, CatalogObject};

/// Public Cloud Storage endpoint
pub const DEFAULT_ENDPOINT: &str = "https://storage.googleapis.com";

const SOURCE_NAME: &str = "gcs";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectList {
    #[serde(default)]
    items: Vec<ObjectResource>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObjectResource {
    name: String,
    /// Decimal string, as the API sends it
    #[serde(default)]
    size: String,
}

/// Objects of one bucket, listed page by page and streamed with `alt=media`.
#[derive(Debug, Clone)]
pub struct GcsSource {
    client: Client,
    endpoint: Url,
    bucket: String,
    prefix: Option<String>,
    access_token: Option<String>,
}

impl GcsSource {
    pub fn new(bucket: impl Into<String>) -> Result<Self> {
        Self::with_endpoint(DEFAULT_ENDPOINT, bucket)
    }

    /// A bucket behind another endpoint, such as an emulator.
    pub fn with_endpoint(endpoint: &str, bucket: impl Into<String>) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| source_error(format!("invalid endpoint {:?}: {}", endpoint, e)))?;
        let client = Client::builder()
            .user_agent(concat!("om/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            endpoint,
            bucket: bucket.into(),
            prefix: None,
            access_token: None,
        })
    }

    /// Send `Authorization: Bearer <token>` with every request.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Ask the API for objects below `prefix` only.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into().trim_matches('/').to_string();
        self.prefix = (!prefix.is_empty()).then(|| format!("{}/", prefix));
        self
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| source_error(format!("endpoint {} cannot carry a path", self.endpoint)))?
            .pop_if_empty()
            .extend(["storage", "v1", "b", self.bucket.as_str(), "o"])
            .extend(segments);
        Ok(url)
    }

    fn get(&self, url: Url) -> RequestBuilder {
        let request = self.client.get(url);
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn list_page(&self, page_token: Option<&str>) -> Result<ObjectList> {
        let mut url = self.url(&[])?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(prefix) = &self.prefix {
                query.append_pair("prefix", prefix);
            }
            if let Some(token) = page_token {
                query.append_pair("pageToken", token);
            }
        }
        tracing::trace!(%url, "listing bucket page");

        let response = self.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(source_error(format!(
                "listing bucket {} failed with {}: {}",
                self.bucket,
                status,
                body.trim()
            )));
        }
        Ok(serde_json::from_slice(&response.bytes().await?)?)
    }
}

#[async_trait]
impl ArtifactSource for GcsSource {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    async fn list(&self) -> Result<Vec<CatalogObject>> {
        let mut objects = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let page = self.list_page(page_token.as_deref()).await?;
            for item in page.items {
                let size = item.size.parse().map_err(|_| {
                    source_error(format!("object {:?} has an invalid size {:?}", item.name, item.size))
                })?;
                objects.push(CatalogObject {
                    key: item.name,
                    size,
                });
            }
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        tracing::debug!(bucket = %self.bucket, objects = objects.len(), "listed bucket");
        Ok(objects)
    }

    async fn open(&self, key: &str) -> Result<ArtifactReader> {
        let mut url = self.url(&[key])?;
        url.query_pairs_mut().append_pair("alt", "media");

        let response = self.get(url).send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ArtifactError::NotFound {
                source_name: SOURCE_NAME.to_string(),
                key: key.to_string(),
            });
        }
        if !status.is_success() {
            return Err(source_error(format!("downloading {:?} failed with {}", key, status)));
        }

        let size = response
            .content_length()
            .ok_or_else(|| source_error(format!("no content length for {:?}", key)))?;
        let body = response
            .bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));
        Ok(ArtifactReader {
            size,
            reader: Box::pin(StreamReader::new(Box::pin(body))),
        })
    }
}

fn source_error(message: String) -> ArtifactError {
    ArtifactError::Source {
        source_name: SOURCE_NAME.to_string(),
        message,
    }
}
