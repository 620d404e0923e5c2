use std::sync::Arc;

use tracing::{debug, info, warn};

use super::events::{ConnectionEvent, ConnectionEvents};
use super::repository::{
    ConnectionRepository, ConnectionState, Lookup, PendingAttempt, SharedConnection,
};
use crate::cluster::EndpointResolver;
use crate::error::{ClientError, ClientResult};
use crate::transport::{NetworkConnection, TransportRegistry};

/// Establishes and shares one connection per cluster.
///
/// Concurrent requests for the same cluster join a single attempt. Attempts
/// run as their own tasks, so a caller giving up does not abandon the
/// attempt for everyone else.
pub struct ConnectionCoordinator {
    resolver: Arc<dyn EndpointResolver>,
    transports: TransportRegistry,
    repository: Arc<ConnectionRepository>,
    events: ConnectionEvents,
}

impl ConnectionCoordinator {
    /// Build a coordinator over `transports`.
    ///
    /// An empty registry still resolves the cluster on connect: unknown
    /// clusters fail with [`ClientError::ClusterNotFound`], known ones with
    /// [`ClientError::NoTransportAvailable`].
    pub fn new(
        resolver: Arc<dyn EndpointResolver>,
        transports: TransportRegistry,
        events: ConnectionEvents,
    ) -> Self {
        Self {
            resolver,
            transports,
            repository: Arc::new(ConnectionRepository::new()),
            events,
        }
    }

    /// Return the connection to `cluster_id`, establishing it if needed.
    ///
    /// Every caller waiting on the same attempt receives the same connection
    /// or the same error. A failed attempt leaves nothing behind, so the next
    /// call starts over.
    pub async fn get_or_create_connection(
        &self,
        cluster_id: &str,
    ) -> ClientResult<Arc<NetworkConnection>> {
        let shared = match self.repository.get_or_insert_pending(cluster_id) {
            Lookup::Existing(shared) => {
                debug!(cluster_id, "Joining existing connection entry");
                shared
            }
            Lookup::Created(attempt) => self.spawn_attempt(attempt),
        };
        shared.await
    }

    fn spawn_attempt(&self, attempt: PendingAttempt) -> SharedConnection {
        let shared = attempt.shared();
        let cluster_id = attempt.cluster_id().to_string();
        let attempt_id = attempt.attempt_id();

        info!(%cluster_id, attempt_id, "Connecting to cluster");
        self.events.publish(ConnectionEvent::connecting(&cluster_id));

        let handle = tokio::spawn(run_attempt(
            attempt,
            Arc::clone(&self.resolver),
            self.transports.clone(),
            self.events.clone(),
        ));

        // The entry is gone if the attempt already failed or was disconnected
        // before its task could be recorded
        if !self
            .repository
            .attach_task(&cluster_id, attempt_id, handle.abort_handle())
        {
            handle.abort();
        }
        shared
    }

    /// Tear down the entry for `cluster_id`.
    ///
    /// A pending attempt is cancelled and its waiters receive
    /// [`ClientError::Cancelled`]; an established connection is closed.
    /// Returns `false` if there was nothing to disconnect.
    pub fn disconnect(&self, cluster_id: &str) -> bool {
        match self.repository.remove(cluster_id) {
            Some(state) => {
                info!(cluster_id, ?state, "Disconnected from cluster");
                self.events.publish(ConnectionEvent::disconnected(cluster_id));
                true
            }
            None => false,
        }
    }

    /// Tear down every entry. Returns how many were removed.
    pub fn disconnect_all(&self) -> usize {
        let drained = self.repository.drain();
        for (cluster_id, _) in &drained {
            self.events.publish(ConnectionEvent::disconnected(cluster_id));
        }
        if !drained.is_empty() {
            info!(count = drained.len(), "Disconnected from all clusters");
        }
        drained.len()
    }

    pub fn state(&self, cluster_id: &str) -> Option<ConnectionState> {
        self.repository.state(cluster_id)
    }

    /// The established connection to `cluster_id`, without connecting
    pub fn connection(&self, cluster_id: &str) -> Option<Arc<NetworkConnection>> {
        self.repository.connection(cluster_id)
    }

    pub fn cluster_ids(&self) -> Vec<String> {
        self.repository.cluster_ids()
    }

    pub fn len(&self) -> usize {
        self.repository.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repository.is_empty()
    }

    pub fn transports(&self) -> &TransportRegistry {
        &self.transports
    }

    pub fn events(&self) -> &ConnectionEvents {
        &self.events
    }
}

async fn run_attempt(
    attempt: PendingAttempt,
    resolver: Arc<dyn EndpointResolver>,
    transports: TransportRegistry,
    events: ConnectionEvents,
) {
    let cluster_id = attempt.cluster_id().to_string();

    match establish(&cluster_id, resolver.as_ref(), &transports).await {
        Ok(connection) => {
            let transport = connection.transport_name().to_string();
            let endpoint = connection.endpoint().to_string();
            match attempt.succeed(connection) {
                Ok(_) => {
                    info!(%cluster_id, %transport, %endpoint, "Connected to cluster");
                    events.publish(ConnectionEvent::connected(&cluster_id, transport));
                }
                Err(_) => debug!(%cluster_id, "Connection established after entry was torn down"),
            }
        }
        Err(error) => {
            warn!(%cluster_id, error = %error, "Connection attempt failed");
            let error = attempt.fail(error);
            events.publish(ConnectionEvent::failed(&cluster_id, error.to_string()));
        }
    }
}

async fn establish(
    cluster_id: &str,
    resolver: &dyn EndpointResolver,
    transports: &TransportRegistry,
) -> ClientResult<Arc<NetworkConnection>> {
    // Resolve even with no transports so unknown clusters report as such
    let selection = resolver
        .resolve(cluster_id, &transports.supported_types())
        .await?;

    for transport in transports.by_priority() {
        let Some(endpoints) = selection.get(transport.transport_type()) else {
            debug!(
                cluster_id,
                transport = transport.name(),
                "Cluster offers no endpoints for transport type"
            );
            continue;
        };

        debug!(
            cluster_id,
            transport = transport.name(),
            priority = transport.priority(),
            "Trying transport"
        );
        match transport.try_connect(cluster_id, endpoints).await {
            Ok(context) => {
                return Ok(Arc::new(NetworkConnection::new(
                    cluster_id, transport, context,
                )));
            }
            Err(e) => {
                warn!(
                    cluster_id,
                    transport = transport.name(),
                    error = %e,
                    "Transport failed to connect"
                );
            }
        }
    }

    if transports.is_empty() {
        warn!(cluster_id, "No transports registered");
    }
    Err(ClientError::no_transport(cluster_id))
}
