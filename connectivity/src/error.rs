//! Client error types
//!
//! Every failure that can reach a caller of the directory, the resolver, or
//! the connection coordinator is a [`ClientError`]. The type is `Clone` so a
//! single outcome can be handed to every waiter of a coalesced operation.

use thiserror::Error;

/// Result type alias for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by federation discovery and connection establishment
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// No cluster URI is known, or a configuration value is invalid
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// The requested cluster is not part of the current federation
    #[error("Cluster '{cluster_id}' not found in federation")]
    ClusterNotFound { cluster_id: String },

    /// Network or decode failure while fetching federation or cluster metadata
    #[error("Failed to fetch cluster metadata from {url}: {message}")]
    FederationFetch { url: String, message: String },

    /// Every registered transport failed, or none matched the cluster's endpoints
    #[error("No transport available to connect to cluster '{cluster_id}'")]
    NoTransportAvailable { cluster_id: String },

    /// The connection attempt was torn down before it completed
    #[error("Connection attempt to cluster '{cluster_id}' was cancelled")]
    Cancelled { cluster_id: String },
}

impl ClientError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a cluster not found error
    pub fn cluster_not_found(cluster_id: impl Into<String>) -> Self {
        Self::ClusterNotFound {
            cluster_id: cluster_id.into(),
        }
    }

    /// Create a metadata fetch error
    pub fn federation_fetch(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::FederationFetch {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create a transport exhaustion error
    pub fn no_transport(cluster_id: impl Into<String>) -> Self {
        Self::NoTransportAvailable {
            cluster_id: cluster_id.into(),
        }
    }

    /// Create a cancellation error
    pub fn cancelled(cluster_id: impl Into<String>) -> Self {
        Self::Cancelled {
            cluster_id: cluster_id.into(),
        }
    }

    /// Whether retrying the same operation later could succeed.
    ///
    /// Configuration and lookup errors need caller action first.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::FederationFetch { .. } | Self::NoTransportAvailable { .. } | Self::Cancelled { .. }
        )
    }
}
