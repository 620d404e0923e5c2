//! Federation topology
//!
//! A federation is the set of clusters reachable from an entry cluster. The
//! entry cluster answers `GET /_federation` with itself (`Current`) and its
//! peers (`Clusters`).

mod directory;

pub use directory::{FederationDirectory, DEFAULT_REFRESH_INTERVAL};

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};

/// A cluster in a federation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClusterDescriptor {
    /// Cluster id, unique within the federation
    pub id: String,
    /// HTTP endpoints that accept requests for this cluster
    #[serde(default)]
    pub endpoints: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ClusterDescriptor {
    pub fn new(id: impl Into<String>, endpoints: Vec<String>) -> Self {
        Self {
            id: id.into(),
            endpoints,
            tags: Vec::new(),
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Federation metadata as returned by `/_federation`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Federation {
    /// The cluster that answered the discovery request
    pub current: ClusterDescriptor,
    #[serde(default)]
    pub clusters: Vec<ClusterDescriptor>,
}

impl Federation {
    /// Find a cluster by id, checking `current` first.
    pub fn get_cluster(&self, id: &str) -> ClientResult<&ClusterDescriptor> {
        if self.current.id == id {
            return Ok(&self.current);
        }
        self.clusters
            .iter()
            .find(|c| c.id == id)
            .ok_or_else(|| ClientError::cluster_not_found(id))
    }

    /// Ids of every cluster in the federation, `current` first, without duplicates
    pub fn cluster_ids(&self) -> Vec<&str> {
        let mut ids = vec![self.current.id.as_str()];
        for cluster in &self.clusters {
            if !ids.contains(&cluster.id.as_str()) {
                ids.push(cluster.id.as_str());
            }
        }
        ids
    }

    /// Clusters carrying the given tag
    pub fn clusters_with_tag<'a>(
        &'a self,
        tag: &'a str,
    ) -> impl Iterator<Item = &'a ClusterDescriptor> {
        std::iter::once(&self.current)
            .chain(self.clusters.iter().filter(move |c| c.id != self.current.id))
            .filter(move |c| c.has_tag(tag))
    }
}
