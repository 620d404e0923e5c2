//! Cluster endpoint discovery
//!
//! Each cluster publishes, at `GET /_cluster/endpoints`, the client-facing
//! transports exposed by its nodes. The resolver fetches that manifest and
//! picks one endpoint set per transport type the client can speak.

mod resolver;
pub mod selection;

pub use resolver::ClusterEndpointResolver;
pub use selection::EndpointSelection;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ClientResult;

fn default_weight() -> f64 {
    1.0
}

/// A transport endpoint advertised by a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TransportEndpoint {
    pub name: String,
    #[serde(rename = "Type")]
    pub transport_type: String,
    /// Addresses clients should use, in preference order
    #[serde(default)]
    pub public_endpoints: Vec<String>,
    /// Relative selection weight among transports of the same type
    #[serde(default = "default_weight")]
    pub weight: f64,
}

impl TransportEndpoint {
    /// Weight used for selection; negative or NaN weights count as zero
    pub fn effective_weight(&self) -> f64 {
        if self.weight > 0.0 {
            self.weight
        } else {
            0.0
        }
    }
}

/// Transports exposed by one server node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NodeTransports {
    pub node_id: String,
    #[serde(default)]
    pub transports: Vec<TransportEndpoint>,
}

/// Result of `GET /_cluster/endpoints`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterEndpointsManifest {
    #[serde(rename = "ClientTransports", default)]
    pub nodes: Vec<NodeTransports>,
}

impl ClusterEndpointsManifest {
    /// All advertised transports across nodes, in manifest order
    pub fn transports(&self) -> impl Iterator<Item = &TransportEndpoint> {
        self.nodes.iter().flat_map(|node| node.transports.iter())
    }
}

/// Resolves a cluster id to selected endpoints per transport type
#[async_trait]
pub trait EndpointResolver: Send + Sync {
    /// Select one endpoint set for each of `transport_types` the cluster offers.
    ///
    /// Types the cluster does not (viably) offer are absent from the result.
    async fn resolve(
        &self,
        cluster_id: &str,
        transport_types: &[String],
    ) -> ClientResult<EndpointSelection>;
}
