//! Integration tests for the connection coordinator
//!
//! Uses a scripted endpoint resolver and fake transports to validate
//! deduplication, priority fallback, failure cleanup and cancellation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use connectivity::{
    ClientError, ClientResult, ConnectionCoordinator, ConnectionEventKind, ConnectionEvents,
    ConnectionState, EndpointResolver, EndpointSelection, NetworkTransport, TransportContext,
    TransportError, TransportRegistry,
};
use futures::future::join_all;
use tokio::sync::Semaphore;

/// Resolver returning a fixed selection, optionally failing or held open
struct ScriptedResolver {
    selection: EndpointSelection,
    resolves: AtomicUsize,
    fail_next: AtomicBool,
    gate: Option<Semaphore>,
    known: Option<Vec<&'static str>>,
}

impl ScriptedResolver {
    fn offering(types: &[&str]) -> Self {
        let selection = types
            .iter()
            .map(|t| (t.to_string(), vec![format!("{t}.karma.example:7000")]))
            .collect::<HashMap<_, _>>();
        Self {
            selection,
            resolves: AtomicUsize::new(0),
            fail_next: AtomicBool::new(false),
            gate: None,
            known: None,
        }
    }

    fn held_open(mut self) -> Self {
        self.gate = Some(Semaphore::new(0));
        self
    }

    /// Report every cluster outside `clusters` as unknown
    fn knowing(mut self, clusters: &[&'static str]) -> Self {
        self.known = Some(clusters.to_vec());
        self
    }

    fn resolves(&self) -> usize {
        self.resolves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EndpointResolver for ScriptedResolver {
    async fn resolve(
        &self,
        cluster_id: &str,
        _transport_types: &[String],
    ) -> ClientResult<EndpointSelection> {
        self.resolves.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await.unwrap();
        }
        if let Some(known) = &self.known {
            if !known.iter().any(|k| *k == cluster_id) {
                return Err(ClientError::cluster_not_found(cluster_id));
            }
        }
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(ClientError::federation_fetch(
                format!("https://{cluster_id}.example/_cluster/endpoints"),
                "HTTP 503",
            ));
        }
        Ok(self.selection.clone())
    }
}

/// Transport that records attempts into a shared log
struct FakeTransport {
    name: &'static str,
    transport_type: &'static str,
    priority: i32,
    succeeds: bool,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
    log: Arc<Mutex<Vec<&'static str>>>,
}

impl FakeTransport {
    fn new(
        name: &'static str,
        priority: i32,
        succeeds: bool,
        log: &Arc<Mutex<Vec<&'static str>>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name,
            transport_type: "tcp",
            priority,
            succeeds,
            connects: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
            log: log.clone(),
        })
    }
}

#[async_trait]
impl NetworkTransport for FakeTransport {
    fn name(&self) -> &str {
        self.name
    }

    fn transport_type(&self) -> &str {
        self.transport_type
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    async fn try_connect(
        &self,
        _cluster_id: &str,
        endpoints: &[String],
    ) -> Result<TransportContext, TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().push(self.name);
        if self.succeeds {
            Ok(TransportContext::new(endpoints[0].clone(), ()))
        } else {
            Err(TransportError::Unreachable {
                endpoint: endpoints[0].clone(),
                message: "connection refused".into(),
            })
        }
    }

    fn try_send(&self, _message: &[u8], _context: &TransportContext) -> bool {
        true
    }

    fn disconnect(&self, _context: &TransportContext) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

fn coordinator(
    resolver: &Arc<ScriptedResolver>,
    transports: &[Arc<FakeTransport>],
) -> Arc<ConnectionCoordinator> {
    let mut registry = TransportRegistry::new();
    for transport in transports {
        registry.register(transport.clone());
    }
    Arc::new(ConnectionCoordinator::new(
        resolver.clone(),
        registry,
        ConnectionEvents::new(),
    ))
}

fn new_log() -> Arc<Mutex<Vec<&'static str>>> {
    Arc::new(Mutex::new(Vec::new()))
}

/// Test: concurrent requests for one cluster share a single attempt
#[tokio::test]
async fn test_concurrent_requests_share_one_connection() {
    let log = new_log();
    let resolver = Arc::new(ScriptedResolver::offering(&["tcp"]));
    let transport = FakeTransport::new("tcp-main", 1, true, &log);
    let coordinator = coordinator(&resolver, &[transport.clone()]);

    let results = join_all((0..10).map(|_| coordinator.get_or_create_connection("A"))).await;

    let first = results[0].as_ref().unwrap();
    for result in &results {
        assert!(Arc::ptr_eq(first, result.as_ref().unwrap()));
    }
    assert_eq!(resolver.resolves(), 1);
    assert_eq!(transport.connects.load(Ordering::SeqCst), 1);
    assert_eq!(coordinator.state("A"), Some(ConnectionState::Connected));

    // Later calls reuse the established connection
    let again = coordinator.get_or_create_connection("A").await.unwrap();
    assert!(Arc::ptr_eq(first, &again));
    assert_eq!(resolver.resolves(), 1);
}

/// Test: many tasks racing on the multi-thread runtime still share a
/// single attempt
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_tasks_share_one_connection() {
    let log = new_log();
    let resolver = Arc::new(ScriptedResolver::offering(&["tcp"]));
    let transport = FakeTransport::new("tcp-main", 1, true, &log);
    let coordinator = coordinator(&resolver, &[transport.clone()]);

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.get_or_create_connection("A").await })
        })
        .collect();

    let mut connections = Vec::new();
    for task in tasks {
        connections.push(task.await.unwrap().unwrap());
    }

    for connection in &connections {
        assert!(Arc::ptr_eq(&connections[0], connection));
    }
    assert_eq!(resolver.resolves(), 1);
    assert_eq!(transport.connects.load(Ordering::SeqCst), 1);
    assert_eq!(coordinator.len(), 1);
}

/// Test: higher priority transport is tried first, lower one takes over
#[tokio::test]
async fn test_falls_back_to_lower_priority_transport() {
    let log = new_log();
    let resolver = Arc::new(ScriptedResolver::offering(&["tcp"]));
    let low = FakeTransport::new("B", 5, true, &log);
    let high = FakeTransport::new("A", 10, false, &log);
    let coordinator = coordinator(&resolver, &[low, high]);

    let connection = coordinator.get_or_create_connection("karma-1").await.unwrap();

    assert_eq!(*log.lock().unwrap(), vec!["A", "B"]);
    assert_eq!(connection.transport_name(), "B");
    assert_eq!(connection.cluster_id(), "karma-1");
    assert_eq!(connection.endpoint(), "tcp.karma.example:7000");
}

/// Test: exhausting every transport reports NoTransportAvailable and
/// leaves no entry
#[tokio::test]
async fn test_all_transports_failing() {
    let log = new_log();
    let resolver = Arc::new(ScriptedResolver::offering(&["tcp"]));
    let coordinator = coordinator(
        &resolver,
        &[
            FakeTransport::new("A", 2, false, &log),
            FakeTransport::new("B", 1, false, &log),
        ],
    );

    let err = coordinator.get_or_create_connection("A").await.unwrap_err();
    assert_eq!(err, ClientError::no_transport("A"));
    assert!(coordinator.is_empty());
}

/// Test: with no transports registered an unknown cluster is still
/// reported as unknown
#[tokio::test]
async fn test_empty_registry_unknown_cluster() {
    let resolver = Arc::new(ScriptedResolver::offering(&["tcp"]).knowing(&["karma-1"]));
    let coordinator = coordinator(&resolver, &[]);

    let err = coordinator.get_or_create_connection("missing").await.unwrap_err();
    assert_eq!(err, ClientError::cluster_not_found("missing"));
    assert!(!err.is_retryable());
    assert_eq!(resolver.resolves(), 1);
    assert!(coordinator.is_empty());
}

/// Test: with no transports registered a known cluster has no usable
/// transport
#[tokio::test]
async fn test_empty_registry_known_cluster() {
    let resolver = Arc::new(ScriptedResolver::offering(&["tcp"]).knowing(&["karma-1"]));
    let coordinator = coordinator(&resolver, &[]);

    let err = coordinator.get_or_create_connection("karma-1").await.unwrap_err();
    assert_eq!(err, ClientError::no_transport("karma-1"));
    assert_eq!(resolver.resolves(), 1);
    assert_eq!(coordinator.state("karma-1"), None);
}

/// Test: a cluster offering none of our transport types
#[tokio::test]
async fn test_no_overlapping_transport_types() {
    let log = new_log();
    let resolver = Arc::new(ScriptedResolver::offering(&["websocket"]));
    let transport = FakeTransport::new("tcp-main", 1, true, &log);
    let coordinator = coordinator(&resolver, &[transport.clone()]);

    let err = coordinator.get_or_create_connection("A").await.unwrap_err();
    assert!(matches!(err, ClientError::NoTransportAvailable { .. }));
    assert_eq!(transport.connects.load(Ordering::SeqCst), 0);
    assert_eq!(coordinator.state("A"), None);
}

/// Test: a failed attempt is forgotten so the next call retries from scratch
#[tokio::test]
async fn test_failure_removes_entry_and_retry_resolves_again() {
    let log = new_log();
    let resolver = Arc::new(ScriptedResolver::offering(&["tcp"]));
    resolver.fail_next.store(true, Ordering::SeqCst);
    let coordinator = coordinator(&resolver, &[FakeTransport::new("tcp", 1, true, &log)]);

    let err = coordinator.get_or_create_connection("A").await.unwrap_err();
    assert!(matches!(err, ClientError::FederationFetch { .. }));
    assert_eq!(coordinator.state("A"), None);

    let connection = coordinator.get_or_create_connection("A").await.unwrap();
    assert_eq!(connection.transport_name(), "tcp");
    assert_eq!(resolver.resolves(), 2);
}

/// Test: disconnecting a pending attempt cancels every waiter
#[tokio::test]
async fn test_disconnect_cancels_pending_attempt() {
    let log = new_log();
    let resolver = Arc::new(ScriptedResolver::offering(&["tcp"]).held_open());
    let transport = FakeTransport::new("tcp", 1, true, &log);
    let coordinator = coordinator(&resolver, &[transport.clone()]);
    let mut events = coordinator.events().subscribe();

    let waiters: Vec<_> = (0..3)
        .map(|_| {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.get_or_create_connection("A").await })
        })
        .collect();

    while resolver.resolves() == 0 {
        tokio::task::yield_now().await;
    }
    assert_eq!(coordinator.state("A"), Some(ConnectionState::Pending));
    assert!(coordinator.disconnect("A"));

    for waiter in waiters {
        assert_eq!(waiter.await.unwrap().unwrap_err(), ClientError::cancelled("A"));
    }
    assert!(coordinator.is_empty());
    assert_eq!(transport.connects.load(Ordering::SeqCst), 0);

    assert_eq!(events.recv().await.unwrap().kind, ConnectionEventKind::Connecting);
    assert_eq!(events.recv().await.unwrap().kind, ConnectionEventKind::Disconnected);
}

/// Test: disconnecting an established connection releases the transport
#[tokio::test]
async fn test_disconnect_closes_established_connection() {
    let log = new_log();
    let resolver = Arc::new(ScriptedResolver::offering(&["tcp"]));
    let transport = FakeTransport::new("tcp", 1, true, &log);
    let coordinator = coordinator(&resolver, &[transport.clone()]);

    let connection = coordinator.get_or_create_connection("A").await.unwrap();
    coordinator.get_or_create_connection("B").await.unwrap();
    assert_eq!(coordinator.cluster_ids(), vec!["A", "B"]);

    assert!(coordinator.disconnect("A"));
    assert!(!coordinator.disconnect("A"));
    assert!(connection.is_closed());
    assert_eq!(transport.disconnects.load(Ordering::SeqCst), 1);

    assert_eq!(coordinator.disconnect_all(), 1);
    assert_eq!(transport.disconnects.load(Ordering::SeqCst), 2);
    assert!(coordinator.is_empty());
}

/// Test: subscribers see the attempt's lifecycle
#[tokio::test]
async fn test_connection_events_published() {
    let log = new_log();
    let resolver = Arc::new(ScriptedResolver::offering(&["tcp"]));
    let coordinator = coordinator(&resolver, &[FakeTransport::new("tcp-main", 1, true, &log)]);
    let mut events = coordinator.events().subscribe();

    coordinator.get_or_create_connection("A").await.unwrap();
    let connecting = events.recv().await.unwrap();
    assert_eq!(connecting.cluster_id, "A");
    assert_eq!(connecting.kind, ConnectionEventKind::Connecting);
    assert_eq!(
        events.recv().await.unwrap().kind,
        ConnectionEventKind::Connected {
            transport: "tcp-main".into()
        }
    );

    resolver.fail_next.store(true, Ordering::SeqCst);
    coordinator.get_or_create_connection("B").await.unwrap_err();
    assert_eq!(events.recv().await.unwrap().kind, ConnectionEventKind::Connecting);
    assert!(matches!(
        events.recv().await.unwrap().kind,
        ConnectionEventKind::Failed { .. }
    ));
}
