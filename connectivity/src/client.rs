//! Client composition
//!
//! [`ClientBuilder`] wires the directory, resolver and coordinator together
//! and hands plugins a chance to register transports and observe the client
//! lifecycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use reqwest::Url;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::cluster::{ClusterEndpointResolver, EndpointResolver, EndpointSelection};
use crate::config::ClientConfig;
use crate::connection::{
    ConnectionCoordinator, ConnectionEvent, ConnectionEvents, ConnectionState,
};
use crate::error::{ClientError, ClientResult};
use crate::federation::{Federation, FederationDirectory};
use crate::http::{HttpFetch, ReqwestFetcher};
use crate::identifiers::ApplicationIdentifier;
use crate::transport::{NetworkConnection, NetworkTransport, TcpTransport, TransportRegistry};

/// Extension point run at client build and shutdown
pub trait ClientPlugin: Send + Sync {
    fn name(&self) -> &str;

    /// Add transports before the client is assembled
    fn register_transports(&self, _registry: &mut TransportRegistry) {}

    /// Called once the client is fully built
    fn on_initializing(&self, _client: &Client) {}

    /// Called at the start of [`Client::shutdown`]
    fn on_disposing(&self, _client: &Client) {}
}

/// Builder for [`Client`]
#[derive(Default)]
pub struct ClientBuilder {
    config: Option<ClientConfig>,
    default_cluster: Option<Url>,
    default_application: Option<ApplicationIdentifier>,
    fetcher: Option<Arc<dyn HttpFetch>>,
    resolver: Option<Arc<dyn EndpointResolver>>,
    transports: TransportRegistry,
    plugins: Vec<Arc<dyn ClientPlugin>>,
}

impl ClientBuilder {
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Entry cluster for federation discovery; overrides the config's
    pub fn default_cluster(mut self, uri: Url) -> Self {
        self.default_cluster = Some(uri);
        self
    }

    pub fn default_application(mut self, application: ApplicationIdentifier) -> Self {
        self.default_application = Some(application);
        self
    }

    /// Replace the HTTP client used for metadata requests
    pub fn http_fetcher(mut self, fetcher: Arc<dyn HttpFetch>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Replace endpoint resolution (federation metadata is still available
    /// through the directory)
    pub fn endpoint_resolver(mut self, resolver: Arc<dyn EndpointResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn add_transport(mut self, transport: Arc<dyn NetworkTransport>) -> Self {
        self.transports.register(transport);
        self
    }

    pub fn add_plugin(mut self, plugin: Arc<dyn ClientPlugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Assemble the client. With no transport registered, TCP is used.
    pub fn build(self) -> ClientResult<Client> {
        let mut config = self.config.unwrap_or_default();
        if let Some(uri) = self.default_cluster {
            config.cluster_uri = Some(uri);
        }
        if let Some(application) = self.default_application {
            config.default_application = Some(application);
        }

        let fetcher: Arc<dyn HttpFetch> = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(ReqwestFetcher::new(config.http_timeout).map_err(|e| {
                ClientError::configuration(format!("Failed to create HTTP client: {}", e))
            })?),
        };

        let mut transports = self.transports;
        for plugin in &self.plugins {
            plugin.register_transports(&mut transports);
        }
        if transports.is_empty() {
            transports.register(Arc::new(TcpTransport::default()));
        }

        let directory = Arc::new(FederationDirectory::new(
            Arc::clone(&fetcher),
            config.cluster_uri.clone(),
            config.refresh_interval,
        ));
        let resolver: Arc<dyn EndpointResolver> = match self.resolver {
            Some(resolver) => resolver,
            None => Arc::new(ClusterEndpointResolver::new(
                Arc::clone(&directory),
                Arc::clone(&fetcher),
            )),
        };
        let coordinator =
            ConnectionCoordinator::new(Arc::clone(&resolver), transports, ConnectionEvents::new());

        let client = Client {
            config,
            directory,
            resolver,
            coordinator,
            plugins: self.plugins,
            shut_down: AtomicBool::new(false),
        };

        for plugin in &client.plugins {
            debug!(plugin = plugin.name(), "Initializing plugin");
            plugin.on_initializing(&client);
        }
        info!(
            cluster_uri = ?client.config.cluster_uri.as_ref().map(Url::as_str),
            transports = client.coordinator.transports().len(),
            plugins = client.plugins.len(),
            "Client ready"
        );
        Ok(client)
    }
}

/// Entry point for federation discovery and cluster connections
pub struct Client {
    config: ClientConfig,
    directory: Arc<FederationDirectory>,
    resolver: Arc<dyn EndpointResolver>,
    coordinator: ConnectionCoordinator,
    plugins: Vec<Arc<dyn ClientPlugin>>,
    shut_down: AtomicBool,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn directory(&self) -> &Arc<FederationDirectory> {
        &self.directory
    }

    pub fn transports(&self) -> &TransportRegistry {
        self.coordinator.transports()
    }

    /// (Re)load federation metadata, optionally from a new entry cluster
    pub async fn connect_to_federation(
        &self,
        cluster_uri: Option<Url>,
    ) -> ClientResult<Arc<Federation>> {
        self.directory.connect_to(cluster_uri).await
    }

    /// Cached federation metadata, refreshed when stale
    pub async fn federation_metadata(&self) -> ClientResult<Arc<Federation>> {
        self.directory.get_current().await
    }

    pub async fn resolve_endpoints(
        &self,
        cluster_id: &str,
        transport_types: &[String],
    ) -> ClientResult<EndpointSelection> {
        self.resolver.resolve(cluster_id, transport_types).await
    }

    pub async fn connect_to_cluster(
        &self,
        cluster_id: &str,
    ) -> ClientResult<Arc<NetworkConnection>> {
        self.coordinator.get_or_create_connection(cluster_id).await
    }

    /// Connect to the cluster hosting `application`, or the configured
    /// default application.
    ///
    /// Applications not pinned to a cluster live on the federation's current
    /// cluster.
    pub async fn connect_to_application(
        &self,
        application: Option<&ApplicationIdentifier>,
    ) -> ClientResult<Arc<NetworkConnection>> {
        let application = application
            .or(self.config.default_application.as_ref())
            .ok_or_else(|| {
                ClientError::configuration(
                    "No application given and no default application configured",
                )
            })?;

        let cluster_id = match &application.cluster {
            Some(cluster) => cluster.clone(),
            None => self.federation_metadata().await?.current.id.clone(),
        };
        debug!(%application, %cluster_id, "Connecting to application");
        self.connect_to_cluster(&cluster_id).await
    }

    pub fn disconnect(&self, cluster_id: &str) -> bool {
        self.coordinator.disconnect(cluster_id)
    }

    pub fn connection_state(&self, cluster_id: &str) -> Option<ConnectionState> {
        self.coordinator.state(cluster_id)
    }

    pub fn connected_clusters(&self) -> Vec<String> {
        self.coordinator.cluster_ids()
    }

    pub fn subscribe_connection_events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.coordinator.events().subscribe()
    }

    /// Run plugin disposal hooks and close every connection.
    ///
    /// Only the first call has any effect.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        for plugin in &self.plugins {
            debug!(plugin = plugin.name(), "Disposing plugin");
            plugin.on_disposing(self);
        }
        let closed = self.coordinator.disconnect_all();
        self.directory.invalidate();
        info!(closed, "Client shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }
}
