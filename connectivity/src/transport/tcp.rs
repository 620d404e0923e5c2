//! Plain TCP transport

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::{debug, warn};

use super::{NetworkTransport, TransportContext, TransportError};

pub const TCP_TRANSPORT_TYPE: &str = "tcp";

/// Settings for [`TcpTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpTransportConfig {
    pub name: String,
    pub priority: i32,
    pub connect_timeout: Duration,
}

impl Default for TcpTransportConfig {
    fn default() -> Self {
        let connect_timeout_ms = std::env::var("FEDERATION_TCP_CONNECT_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5000);
        Self {
            name: "tcp".to_string(),
            priority: 0,
            connect_timeout: Duration::from_millis(connect_timeout_ms),
        }
    }
}

struct TcpHandle {
    stream: Mutex<Option<TcpStream>>,
}

/// Connects to `host:port` endpoints over TCP
pub struct TcpTransport {
    config: TcpTransportConfig,
}

impl TcpTransport {
    pub fn new(config: TcpTransportConfig) -> Self {
        Self { config }
    }

    pub fn with_priority(priority: i32) -> Self {
        Self::new(TcpTransportConfig {
            priority,
            ..TcpTransportConfig::default()
        })
    }

    pub fn config(&self) -> &TcpTransportConfig {
        &self.config
    }

    async fn connect_one(&self, endpoint: &str) -> Result<TcpStream, TransportError> {
        let address = parse_endpoint(endpoint)?;
        let timeout = self.config.connect_timeout;
        match tokio::time::timeout(timeout, TcpStream::connect(address)).await {
            Ok(Ok(stream)) => {
                // Messages are small and latency sensitive
                if let Err(e) = stream.set_nodelay(true) {
                    debug!(endpoint, error = %e, "Could not disable Nagle");
                }
                Ok(stream)
            }
            Ok(Err(e)) => Err(TransportError::Unreachable {
                endpoint: endpoint.to_string(),
                message: e.to_string(),
            }),
            Err(_) => Err(TransportError::Timeout {
                endpoint: endpoint.to_string(),
                after_ms: timeout.as_millis() as u64,
            }),
        }
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new(TcpTransportConfig::default())
    }
}

/// Accept `tcp://host:port` or bare `host:port`
fn parse_endpoint(endpoint: &str) -> Result<&str, TransportError> {
    let address = endpoint.strip_prefix("tcp://").unwrap_or(endpoint);
    let address = address.trim_end_matches('/');
    let invalid = |reason: &str| TransportError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        reason: reason.to_string(),
    };

    if address.contains("://") {
        return Err(invalid("unsupported scheme"));
    }
    match address.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => Ok(address),
        _ => Err(invalid("expected host:port")),
    }
}

#[async_trait]
impl NetworkTransport for TcpTransport {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn transport_type(&self) -> &str {
        TCP_TRANSPORT_TYPE
    }

    fn priority(&self) -> i32 {
        self.config.priority
    }

    async fn try_connect(
        &self,
        cluster_id: &str,
        endpoints: &[String],
    ) -> Result<TransportContext, TransportError> {
        let mut last_error = TransportError::NoEndpoints {
            transport: self.config.name.clone(),
        };

        for endpoint in endpoints {
            match self.connect_one(endpoint).await {
                Ok(stream) => {
                    debug!(cluster_id, endpoint = %endpoint, "TCP connection established");
                    return Ok(TransportContext::new(
                        endpoint.clone(),
                        TcpHandle {
                            stream: Mutex::new(Some(stream)),
                        },
                    ));
                }
                Err(e) => {
                    warn!(cluster_id, error = %e, "TCP endpoint failed");
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }

    fn try_send(&self, message: &[u8], context: &TransportContext) -> bool {
        let Some(handle) = context.downcast_ref::<TcpHandle>() else {
            return false;
        };
        let guard = handle.stream.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref().map(|stream| stream.try_write(message)) {
            Some(Ok(written)) => written == message.len(),
            Some(Err(e)) => {
                debug!(endpoint = context.endpoint(), error = %e, "TCP send failed");
                false
            }
            None => false,
        }
    }

    fn disconnect(&self, context: &TransportContext) {
        if let Some(handle) = context.downcast_ref::<TcpHandle>() {
            let stream = handle
                .stream
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            // Dropping the stream closes the socket
            drop(stream);
        }
    }
}
