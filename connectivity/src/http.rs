//! HTTP metadata fetching
//!
//! Discovery only ever needs "GET this URL, give me the body text". The
//! [`HttpFetch`] trait is that seam; [`ReqwestFetcher`] is the production
//! implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use crate::error::{ClientError, ClientResult};

/// Failure to retrieve a metadata document
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("Request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
}

/// Issue a GET and return the response body as text
#[async_trait]
pub trait HttpFetch: Send + Sync {
    async fn get_text(&self, url: &Url) -> Result<String, FetchError>;
}

/// [`HttpFetch`] backed by a shared `reqwest::Client`
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    /// Create a fetcher whose requests time out after `timeout`.
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Wrap an already configured client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpFetch for ReqwestFetcher {
    async fn get_text(&self, url: &Url) -> Result<String, FetchError> {
        let request_error = |e: reqwest::Error| FetchError::Request {
            url: url.to_string(),
            message: e.to_string(),
        };

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(request_error)?;
        debug!(%url, bytes = body.len(), "Fetched metadata document");
        Ok(body)
    }
}

/// GET `path` relative to `base` and decode the body as JSON.
///
/// `path` is absolute, so it replaces any path already present on `base`.
/// Unusable bases, network and decode failures all surface as
/// [`ClientError::FederationFetch`].
pub(crate) async fn fetch_document<T: DeserializeOwned>(
    fetcher: &dyn HttpFetch,
    base: &Url,
    path: &str,
) -> ClientResult<T> {
    let url = base.join(path).map_err(|e| {
        ClientError::federation_fetch(base.as_str(), format!("cannot request {}: {}", path, e))
    })?;

    let body = fetcher
        .get_text(&url)
        .await
        .map_err(|e| ClientError::federation_fetch(url.as_str(), e.to_string()))?;

    serde_json::from_str(&body).map_err(|e| {
        ClientError::federation_fetch(url.as_str(), format!("invalid document: {}", e))
    })
}
