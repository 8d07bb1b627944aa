//! UAA token acquisition

use reqwest::Client;
use serde::Deserialize;
use url::Url;

use crate::error::{DirectorError, Result};

/// Client id used for the password grant
const OPSMAN_CLIENT: &str = "opsman";

const TOKEN_ATTEMPTS: usize = 3;

/// How to obtain a token
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Resource-owner password grant through the `opsman` client
    Password { username: String, password: String },
    /// Client-credentials grant
    Client { client_id: String, client_secret: String },
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .finish_non_exhaustive(),
            Self::Client { client_id, .. } => f
                .debug_struct("Client")
                .field("client_id", client_id)
                .finish_non_exhaustive(),
        }
    }
}

impl Credentials {
    /// Client credentials win over a username and password.
    pub fn from_parts(
        username: Option<String>,
        password: Option<String>,
        client_id: Option<String>,
        client_secret: Option<String>,
    ) -> Option<Self> {
        match (client_id, client_secret, username, password) {
            (Some(client_id), Some(client_secret), _, _) if !client_id.is_empty() => Some(Self::Client {
                client_id,
                client_secret,
            }),
            (_, _, Some(username), Some(password)) if !username.is_empty() => Some(Self::Password {
                username,
                password,
            }),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// `<target>/uaa/oauth/token`
pub fn token_url(base: &Url) -> Result<Url> {
    base.join("/uaa/oauth/token").map_err(|e| DirectorError::InvalidTarget {
        target: base.to_string(),
        reason: e.to_string(),
    })
}

/// Fetch an access token, retrying connection failures.
pub async fn fetch_token(http: &Client, url: &Url, credentials: &Credentials) -> Result<String> {
    let mut last_error = None;
    for attempt in 1..=TOKEN_ATTEMPTS {
        if attempt > 1 {
            tracing::warn!(attempt, of = TOKEN_ATTEMPTS, "retrying token request");
        }
        match request_token(http, url, credentials).await {
            Ok(token) => return Ok(token),
            Err(err) if err.is_connect() || err.is_timeout() => {
                tracing::warn!(error = %err, "token could not be retrieved from target url");
                last_error = Some(err.to_string());
            }
            Err(err) => {
                return Err(DirectorError::Authentication(format!(
                    "token could not be retrieved from target url: {}",
                    err
                )))
            }
        }
    }
    Err(DirectorError::Authentication(format!(
        "token could not be retrieved from target url: {}",
        last_error.unwrap_or_default()
    )))
}

async fn request_token(
    http: &Client,
    url: &Url,
    credentials: &Credentials,
) -> std::result::Result<String, reqwest::Error> {
    let request = match credentials {
        Credentials::Password { username, password } => http
            .post(url.clone())
            .basic_auth(OPSMAN_CLIENT, Some(""))
            .form(&[
                ("grant_type", "password"),
                ("username", username.as_str()),
                ("password", password.as_str()),
            ]),
        Credentials::Client {
            client_id,
            client_secret,
        } => http
            .post(url.clone())
            .basic_auth(client_id, Some(client_secret))
            .form(&[("grant_type", "client_credentials")]),
    };
    tracing::trace!(url = %url, "POST token");
    let response = request
        .header(reqwest::header::ACCEPT, "application/json")
        .send()
        .await?
        .error_for_status()?;
    let token: TokenResponse = response.json().await?;
    Ok(token.access_token)
}
