//! Client configuration
//!
//! Defaults come from environment variables; a TOML file can override them:
//!
//! ```toml
//! cluster_uri = "https://karma-1.example"
//! refresh_interval_secs = 30
//! http_timeout_secs = 10
//!
//! [default_application]
//! directory = "samples"
//! application = "chat"
//! ```

use std::path::Path;
use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;

use crate::error::{ClientError, ClientResult};
use crate::federation::DEFAULT_REFRESH_INTERVAL;
use crate::identifiers::ApplicationIdentifier;

const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

/// Settings for a [`Client`](crate::Client)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Entry cluster used for federation discovery
    pub cluster_uri: Option<Url>,
    /// Age after which cached federation metadata is refetched
    pub refresh_interval: Duration,
    /// Timeout for metadata HTTP requests
    pub http_timeout: Duration,
    pub default_application: Option<ApplicationIdentifier>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            cluster_uri: std::env::var("FEDERATION_CLUSTER_URI")
                .ok()
                .and_then(|v| Url::parse(&v).ok()),
            refresh_interval: std::env::var("FEDERATION_REFRESH_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_REFRESH_INTERVAL),
            http_timeout: Duration::from_secs(
                std::env::var("FEDERATION_HTTP_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS),
            ),
            default_application: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    cluster_uri: Option<String>,
    refresh_interval_secs: Option<u64>,
    http_timeout_secs: Option<u64>,
    default_application: Option<ApplicationIdentifier>,
}

impl ClientConfig {
    /// Defaults overlaid with the keys present in a TOML document
    pub fn from_toml_str(text: &str) -> ClientResult<Self> {
        let file: ConfigFile = toml::from_str(text)
            .map_err(|e| ClientError::configuration(format!("Invalid config: {}", e)))?;
        Self::default().overlay(file)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> ClientResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ClientError::configuration(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    fn overlay(mut self, file: ConfigFile) -> ClientResult<Self> {
        if let Some(uri) = file.cluster_uri {
            self.cluster_uri = Some(parse_cluster_uri(&uri)?);
        }
        if let Some(secs) = file.refresh_interval_secs {
            self.refresh_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = file.http_timeout_secs {
            if secs == 0 {
                return Err(ClientError::configuration(
                    "http_timeout_secs must be greater than zero",
                ));
            }
            self.http_timeout = Duration::from_secs(secs);
        }
        if let Some(application) = file.default_application {
            self.default_application = Some(application);
        }
        Ok(self)
    }

    pub fn with_cluster_uri(mut self, uri: Url) -> Self {
        self.cluster_uri = Some(uri);
        self
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }
}

/// Parse an absolute `http(s)` cluster URI
pub fn parse_cluster_uri(text: &str) -> ClientResult<Url> {
    let url = Url::parse(text).map_err(|e| {
        ClientError::configuration(format!("Invalid cluster URI '{}': {}", text, e))
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ClientError::configuration(format!(
            "Unsupported cluster URI scheme '{}' in '{}'",
            other, text
        ))),
    }
}
