//! Network transports
//!
//! A transport knows how to open a connection to a cluster given the public
//! endpoints the cluster advertised for the transport's type. The coordinator
//! tries registered transports highest priority first.

pub mod tcp;

pub use tcp::{TcpTransport, TcpTransportConfig};

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;

/// Failure of a single transport's connection attempt
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("No endpoints supplied for transport '{transport}'")]
    NoEndpoints { transport: String },

    #[error("Invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("Endpoint {endpoint} unreachable: {message}")]
    Unreachable { endpoint: String, message: String },

    #[error("Connecting to {endpoint} timed out after {after_ms}ms")]
    Timeout { endpoint: String, after_ms: u64 },
}

/// Opaque per-connection state owned by the transport that created it
#[derive(Clone)]
pub struct TransportContext {
    endpoint: String,
    handle: Arc<dyn Any + Send + Sync>,
}

impl TransportContext {
    pub fn new<H: Any + Send + Sync>(endpoint: impl Into<String>, handle: H) -> Self {
        Self {
            endpoint: endpoint.into(),
            handle: Arc::new(handle),
        }
    }

    /// The endpoint the connection was established to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Borrow the transport-specific handle, if it has type `H`
    pub fn downcast_ref<H: Any>(&self) -> Option<&H> {
        self.handle.downcast_ref::<H>()
    }
}

impl fmt::Debug for TransportContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportContext")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

/// A way of reaching a cluster (TCP, websocket, relay...)
#[async_trait]
pub trait NetworkTransport: Send + Sync {
    /// Instance name, used in logs and events
    fn name(&self) -> &str;

    /// Transport type as advertised in cluster manifests, e.g. `"tcp"`
    fn transport_type(&self) -> &str;

    /// Higher priorities are tried first
    fn priority(&self) -> i32;

    /// Open a connection to `cluster_id` using one of `endpoints`.
    async fn try_connect(
        &self,
        cluster_id: &str,
        endpoints: &[String],
    ) -> Result<TransportContext, TransportError>;

    /// Send without waiting. Returns `false` if the message was not fully sent.
    fn try_send(&self, message: &[u8], context: &TransportContext) -> bool;

    /// Release the connection described by `context`
    fn disconnect(&self, context: &TransportContext);
}

/// Transports available to the client
#[derive(Default, Clone)]
pub struct TransportRegistry {
    transports: Vec<Arc<dyn NetworkTransport>>,
}

impl TransportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, transport: Arc<dyn NetworkTransport>) {
        debug!(
            name = transport.name(),
            transport_type = transport.transport_type(),
            priority = transport.priority(),
            "Registered transport"
        );
        self.transports.push(transport);
    }

    /// Transports by descending priority; ties keep registration order
    pub fn by_priority(&self) -> Vec<Arc<dyn NetworkTransport>> {
        let mut ordered = self.transports.clone();
        ordered.sort_by_key(|t| std::cmp::Reverse(t.priority()));
        ordered
    }

    /// Distinct transport types, in registration order
    pub fn supported_types(&self) -> Vec<String> {
        let mut types: Vec<String> = Vec::new();
        for transport in &self.transports {
            if !types.iter().any(|t| t == transport.transport_type()) {
                types.push(transport.transport_type().to_string());
            }
        }
        types
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn NetworkTransport>> {
        self.transports.iter().find(|t| t.name() == name).cloned()
    }

    pub fn len(&self) -> usize {
        self.transports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transports.is_empty()
    }
}

impl fmt::Debug for TransportRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.transports.iter().map(|t| t.name()))
            .finish()
    }
}

/// An established connection to a cluster
pub struct NetworkConnection {
    cluster_id: String,
    transport: Arc<dyn NetworkTransport>,
    context: TransportContext,
    established_at: DateTime<Utc>,
    closed: AtomicBool,
}

impl NetworkConnection {
    pub fn new(
        cluster_id: impl Into<String>,
        transport: Arc<dyn NetworkTransport>,
        context: TransportContext,
    ) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            transport,
            context,
            established_at: Utc::now(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn cluster_id(&self) -> &str {
        &self.cluster_id
    }

    pub fn transport_name(&self) -> &str {
        self.transport.name()
    }

    pub fn transport_type(&self) -> &str {
        self.transport.transport_type()
    }

    pub fn endpoint(&self) -> &str {
        self.context.endpoint()
    }

    pub fn context(&self) -> &TransportContext {
        &self.context
    }

    pub fn established_at(&self) -> DateTime<Utc> {
        self.established_at
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Send `message` over the underlying transport without waiting
    pub fn send(&self, message: &[u8]) -> bool {
        !self.is_closed() && self.transport.try_send(message, &self.context)
    }

    /// Release the transport connection. Later calls are no-ops.
    ///
    /// Callers outside the crate go through `disconnect` so the owning entry
    /// is removed along with the connection.
    pub(crate) fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!(
                cluster_id = %self.cluster_id,
                transport = self.transport.name(),
                "Closing connection"
            );
            self.transport.disconnect(&self.context);
        }
    }
}

impl fmt::Debug for NetworkConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkConnection")
            .field("cluster_id", &self.cluster_id)
            .field("transport", &self.transport.name())
            .field("endpoint", &self.context.endpoint())
            .field("established_at", &self.established_at)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct Named {
        name: &'static str,
        transport_type: &'static str,
        priority: i32,
        disconnects: AtomicUsize,
    }

    fn named(name: &'static str, transport_type: &'static str, priority: i32) -> Arc<Named> {
        Arc::new(Named {
            name,
            transport_type,
            priority,
            disconnects: AtomicUsize::new(0),
        })
    }

    #[async_trait]
    impl NetworkTransport for Named {
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
            Ok(TransportContext::new(endpoints[0].clone(), ()))
        }
        fn try_send(&self, message: &[u8], _context: &TransportContext) -> bool {
            !message.is_empty()
        }
        fn disconnect(&self, _context: &TransportContext) {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_by_priority_descending_and_stable() {
        let mut registry = TransportRegistry::new();
        registry.register(named("low", "tcp", 1));
        registry.register(named("first-high", "tcp", 10));
        registry.register(named("second-high", "websocket", 10));

        let order: Vec<_> = registry
            .by_priority()
            .iter()
            .map(|t| t.name().to_string())
            .collect();
        assert_eq!(order, vec!["first-high", "second-high", "low"]);
    }

    #[test]
    fn test_supported_types_distinct() {
        let mut registry = TransportRegistry::new();
        registry.register(named("a", "tcp", 1));
        registry.register(named("b", "tcp", 2));
        registry.register(named("c", "websocket", 3));
        assert_eq!(registry.supported_types(), vec!["tcp", "websocket"]);
        assert!(registry.get("b").is_some());
        assert!(registry.get("zzz").is_none());
    }

    #[test]
    fn test_context_downcast() {
        let context = TransportContext::new("h:1", 42u32);
        assert_eq!(context.downcast_ref::<u32>(), Some(&42));
        assert!(context.downcast_ref::<String>().is_none());
    }

    #[test]
    fn test_connection_close_is_idempotent() {
        let transport = named("a", "tcp", 1);
        let connection =
            NetworkConnection::new("karma-1", transport.clone(), TransportContext::new("h:1", ()));
        assert!(connection.send(b"ping"));

        connection.close();
        connection.close();
        assert!(connection.is_closed());
        assert!(!connection.send(b"ping"));
        assert_eq!(transport.disconnects.load(Ordering::SeqCst), 1);
    }
}
