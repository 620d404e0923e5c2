//! Federation connectivity client
//!
//! Discovers the federation of clusters an entry cluster belongs to, resolves
//! which transports and endpoints a target cluster exposes, and establishes
//! one shared connection per cluster.
//!
//! # Layers
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ Client / ClientBuilder / ClientPlugin        │
//! └──────────────┬───────────────────────────────┘
//!                ▼
//! ┌──────────────────────────────────────────────┐
//! │ ConnectionCoordinator ─► ConnectionRepository │
//! └──────┬─────────────────────────┬─────────────┘
//!        ▼                         ▼
//! ┌────────────────────┐   ┌──────────────────────┐
//! │ EndpointResolver   │   │ TransportRegistry    │
//! │ (cluster manifest) │   │ (TCP, ...)           │
//! └──────┬─────────────┘   └──────────────────────┘
//!        ▼
//! ┌────────────────────┐
//! │ FederationDirectory│──► HttpFetch (reqwest)
//! └────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use connectivity::Client;
//!
//! let client = Client::builder()
//!     .default_cluster("https://karma-1.example".parse()?)
//!     .build()?;
//!
//! let federation = client.federation_metadata().await?;
//! let connection = client.connect_to_cluster(&federation.current.id).await?;
//! connection.send(b"hello");
//! ```

pub mod client;
pub mod cluster;
pub mod config;
pub mod connection;
pub mod error;
pub mod federation;
pub mod http;
pub mod identifiers;
pub mod session_id;
pub mod transport;

pub use client::{Client, ClientBuilder, ClientPlugin};
pub use cluster::{
    ClusterEndpointResolver, ClusterEndpointsManifest, EndpointResolver, EndpointSelection,
    NodeTransports, TransportEndpoint,
};
pub use config::{parse_cluster_uri, ClientConfig};
pub use connection::{
    ConnectionCoordinator, ConnectionEvent, ConnectionEventKind, ConnectionEvents,
    ConnectionRepository, ConnectionState,
};
pub use error::{ClientError, ClientResult};
pub use federation::{ClusterDescriptor, Federation, FederationDirectory, DEFAULT_REFRESH_INTERVAL};
pub use http::{FetchError, HttpFetch, ReqwestFetcher};
pub use identifiers::{ApplicationIdentifier, SceneIdentifier};
pub use session_id::{SessionId, SessionIdError};
pub use transport::{
    NetworkConnection, NetworkTransport, TcpTransport, TcpTransportConfig, TransportContext,
    TransportError, TransportRegistry,
};

/// Re-exported so callers can name URLs without depending on reqwest
pub use reqwest::Url;
