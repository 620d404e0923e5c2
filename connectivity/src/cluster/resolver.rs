use std::sync::Arc;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use reqwest::Url;
use tracing::{debug, info};

use super::selection::{select_endpoints, EndpointSelection};
use super::{ClusterEndpointsManifest, EndpointResolver};
use crate::error::{ClientError, ClientResult};
use crate::federation::FederationDirectory;
use crate::http::{fetch_document, HttpFetch};

const CLUSTER_ENDPOINTS_PATH: &str = "/_cluster/endpoints";

/// Resolves endpoints by asking the target cluster for its transport manifest
pub struct ClusterEndpointResolver {
    directory: Arc<FederationDirectory>,
    fetcher: Arc<dyn HttpFetch>,
}

impl ClusterEndpointResolver {
    pub fn new(directory: Arc<FederationDirectory>, fetcher: Arc<dyn HttpFetch>) -> Self {
        Self { directory, fetcher }
    }

    pub fn directory(&self) -> &Arc<FederationDirectory> {
        &self.directory
    }

    /// Fetch the raw transport manifest of `cluster_id` from one of its
    /// HTTP endpoints, chosen at random.
    pub async fn fetch_manifest(&self, cluster_id: &str) -> ClientResult<ClusterEndpointsManifest> {
        let federation = self.directory.get_current().await?;
        let cluster = federation.get_cluster(cluster_id)?;

        let endpoint = cluster
            .endpoints
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or_else(|| {
                ClientError::federation_fetch(
                    cluster_id,
                    "cluster declares no endpoints in federation metadata",
                )
            })?;

        let base = Url::parse(&endpoint).map_err(|e| {
            ClientError::federation_fetch(&endpoint, format!("invalid cluster endpoint: {}", e))
        })?;

        debug!(cluster_id, %base, "Fetching cluster transport manifest");
        fetch_document(self.fetcher.as_ref(), &base, CLUSTER_ENDPOINTS_PATH).await
    }
}

#[async_trait]
impl EndpointResolver for ClusterEndpointResolver {
    async fn resolve(
        &self,
        cluster_id: &str,
        transport_types: &[String],
    ) -> ClientResult<EndpointSelection> {
        let manifest = self.fetch_manifest(cluster_id).await?;
        let selection = select_endpoints(&manifest, transport_types, &mut rand::thread_rng());

        info!(
            cluster_id,
            requested = transport_types.len(),
            selected = selection.len(),
            "Resolved cluster endpoints"
        );
        Ok(selection)
    }
}
