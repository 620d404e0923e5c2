//! Connection state updates
//!
//! The coordinator publishes a [`ConnectionEvent`] on every state change of a
//! cluster connection. Subscribers get a `tokio::sync::broadcast` receiver;
//! slow subscribers lag and skip events rather than blocking publishers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionEventKind {
    Connecting,
    Connected { transport: String },
    Failed { reason: String },
    Disconnected,
}

/// A state change of the connection to one cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionEvent {
    pub cluster_id: String,
    #[serde(flatten)]
    pub kind: ConnectionEventKind,
    pub timestamp: DateTime<Utc>,
}

impl ConnectionEvent {
    pub fn new(cluster_id: impl Into<String>, kind: ConnectionEventKind) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            kind,
            timestamp: Utc::now(),
        }
    }

    pub fn connecting(cluster_id: impl Into<String>) -> Self {
        Self::new(cluster_id, ConnectionEventKind::Connecting)
    }

    pub fn connected(cluster_id: impl Into<String>, transport: impl Into<String>) -> Self {
        Self::new(
            cluster_id,
            ConnectionEventKind::Connected {
                transport: transport.into(),
            },
        )
    }

    pub fn failed(cluster_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(
            cluster_id,
            ConnectionEventKind::Failed {
                reason: reason.into(),
            },
        )
    }

    pub fn disconnected(cluster_id: impl Into<String>) -> Self {
        Self::new(cluster_id, ConnectionEventKind::Disconnected)
    }

    /// Short name of the event kind, for logs
    pub fn state_name(&self) -> &'static str {
        match self.kind {
            ConnectionEventKind::Connecting => "connecting",
            ConnectionEventKind::Connected { .. } => "connected",
            ConnectionEventKind::Failed { .. } => "failed",
            ConnectionEventKind::Disconnected => "disconnected",
        }
    }
}

/// Broadcast bus for [`ConnectionEvent`]s
#[derive(Debug, Clone)]
pub struct ConnectionEvents {
    sender: broadcast::Sender<ConnectionEvent>,
}

impl ConnectionEvents {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Publish to all current subscribers. Having none is fine.
    pub fn publish(&self, event: ConnectionEvent) {
        let state = event.state_name();
        let cluster_id = event.cluster_id.clone();
        match self.sender.send(event) {
            Ok(receivers) => debug!(%cluster_id, state, receivers, "Connection event published"),
            Err(_) => debug!(%cluster_id, state, "Connection event published (no receivers)"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ConnectionEvents {
    fn default() -> Self {
        Self::new()
    }
}
