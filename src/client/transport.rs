//! Draft transport
//!
//! The [`DraftTransport`] trait is the scheduler's only view of the network.
//! [`HttpDraftTransport`] speaks the draft service's HTTP contract; tests
//! substitute in-process fakes.

use crate::config::Config;
use crate::error::MetadraftError;
use crate::payload::Document;
use crate::store::{DraftCreated, DraftId, DraftUpdated, DraftView};
use reqwest::header::{HeaderMap, HeaderValue, COOKIE};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Why a transport call did not succeed.
///
/// The scheduler branches on these: ownership and not-found invalidate the
/// remembered draft id, rejections and network failures leave it alone.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The remembered draft belongs to another session (HTTP 403)
    #[error("draft is owned by another session")]
    Ownership,

    /// The remembered draft no longer exists (HTTP 404)
    #[error("draft not found")]
    NotFound,

    /// The service refused the request (malformed payload, too large, ...)
    #[error("draft rejected: {0}")]
    Rejected(String),

    /// Transient failure: timeout, connection error, 5xx
    #[error("network error: {0}")]
    Network(String),
}

/// Network calls the autosave component makes.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait DraftTransport: Send + Sync + std::fmt::Debug {
    /// Create a new draft holding `payload`.
    async fn create(&self, payload: &Document) -> Result<DraftCreated, TransportError>;

    /// Replace the payload of draft `id`.
    async fn update(&self, id: &DraftId, payload: &Document)
        -> Result<DraftUpdated, TransportError>;

    /// The session's most recently updated draft, if any.
    async fn latest(&self) -> Result<Option<DraftView>, TransportError>;

    /// Delete draft `id`.
    async fn delete(&self, id: &DraftId) -> Result<(), TransportError>;
}

/// HTTP implementation of [`DraftTransport`].
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use url::Url;
/// use metadraft::client::transport::HttpDraftTransport;
///
/// let transport = HttpDraftTransport::new(
///     Url::parse("http://localhost:8080").unwrap(),
///     "metadraft_session",
///     "session-credential",
///     Duration::from_secs(15),
/// )
/// .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct HttpDraftTransport {
    client: reqwest::Client,
    base: Url,
}

impl HttpDraftTransport {
    /// Build a transport for the service at `endpoint`, authenticating with
    /// `credential` in the `cookie_name` cookie.
    ///
    /// # Errors
    ///
    /// Returns an error if the credential is not a valid header value or the
    /// HTTP client cannot be constructed.
    pub fn new(
        endpoint: Url,
        cookie_name: &str,
        credential: &str,
        timeout: Duration,
    ) -> crate::error::Result<Self> {
        let mut headers = HeaderMap::new();
        let mut cookie = HeaderValue::from_str(&format!("{}={}", cookie_name, credential))
            .map_err(|e| MetadraftError::Config(format!("Invalid session credential: {}", e)))?;
        cookie.set_sensitive(true);
        headers.insert(COOKIE, cookie);

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        let mut base = endpoint;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self { client, base })
    }

    /// Build a transport from the `autosave` and `server` config sections
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `autosave.endpoint` is not a URL.
    pub fn from_config(config: &Config, credential: &str) -> crate::error::Result<Self> {
        let endpoint = Url::parse(&config.autosave.endpoint).map_err(|e| {
            MetadraftError::Config(format!(
                "Invalid autosave endpoint {}: {}",
                config.autosave.endpoint, e
            ))
        })?;
        Self::new(
            endpoint,
            &config.server.session_cookie,
            credential,
            config.autosave.request_timeout(),
        )
    }

    fn url(&self, path: &str) -> Result<Url, TransportError> {
        self.base
            .join(path)
            .map_err(|e| TransportError::Rejected(format!("invalid draft url: {}", e)))
    }
}

fn network(err: reqwest::Error) -> TransportError {
    TransportError::Network(err.to_string())
}

async fn error_for(response: Response) -> TransportError {
    let status = response.status();
    let detail = response
        .json::<serde_json::Value>()
        .await
        .ok()
        .and_then(|body| body.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or_else(|| status.to_string());

    match status {
        StatusCode::FORBIDDEN => TransportError::Ownership,
        StatusCode::NOT_FOUND => TransportError::NotFound,
        s if s.is_server_error() || s == StatusCode::REQUEST_TIMEOUT => {
            TransportError::Network(detail)
        }
        _ => TransportError::Rejected(detail),
    }
}

async fn parse<T: DeserializeOwned>(response: Response) -> Result<T, TransportError> {
    if !response.status().is_success() {
        return Err(error_for(response).await);
    }
    response
        .json::<T>()
        .await
        .map_err(|e| TransportError::Network(format!("unreadable response: {}", e)))
}

fn body(payload: &Document) -> serde_json::Value {
    json!({ "payload": payload })
}

#[async_trait::async_trait]
impl DraftTransport for HttpDraftTransport {
    async fn create(&self, payload: &Document) -> Result<DraftCreated, TransportError> {
        let response = self
            .client
            .post(self.url("drafts")?)
            .json(&body(payload))
            .send()
            .await
            .map_err(network)?;
        parse(response).await
    }

    async fn update(
        &self,
        id: &DraftId,
        payload: &Document,
    ) -> Result<DraftUpdated, TransportError> {
        let response = self
            .client
            .put(self.url(&format!("drafts/{}", id))?)
            .json(&body(payload))
            .send()
            .await
            .map_err(network)?;
        parse(response).await
    }

    async fn latest(&self) -> Result<Option<DraftView>, TransportError> {
        let response = self
            .client
            .get(self.url("drafts/session/latest")?)
            .send()
            .await
            .map_err(network)?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        parse(response).await.map(Some)
    }

    async fn delete(&self, id: &DraftId) -> Result<(), TransportError> {
        let response = self
            .client
            .delete(self.url(&format!("drafts/{}", id))?)
            .send()
            .await
            .map_err(network)?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(error_for(response).await)
        }
    }
}
