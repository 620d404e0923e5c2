//! End-to-end client tests
//!
//! Federation and cluster metadata come from an in-memory fake; the TCP
//! transport connects to a real local listener.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use connectivity::{
    ApplicationIdentifier, Client, ClientError, ConnectionEventKind, ConnectionState, FetchError,
    HttpFetch, TcpTransport, TcpTransportConfig, Url,
};
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;

/// Serves canned documents keyed by URL
struct MetadataServer {
    documents: HashMap<String, String>,
}

#[async_trait]
impl HttpFetch for MetadataServer {
    async fn get_text(&self, url: &Url) -> Result<String, FetchError> {
        self.documents
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
    }
}

/// A federation of two clusters whose TCP endpoints point at `tcp_endpoint`
fn metadata_server(tcp_endpoint: &str) -> Arc<MetadataServer> {
    let federation = r#"{
        "Current": { "Id": "karma-1", "Endpoints": ["https://karma-1.example"] },
        "Clusters": [ { "Id": "karma-2", "Endpoints": ["https://karma-2.example"] } ]
    }"#;
    let manifest = format!(
        r#"{{ "ClientTransports": [ {{ "NodeId": "n1", "Transports": [
            {{ "Name": "tcp", "Type": "tcp", "PublicEndpoints": ["tcp://{tcp_endpoint}"], "Weight": 1 }},
            {{ "Name": "ws", "Type": "websocket", "PublicEndpoints": ["wss://karma.example/ws"] }}
        ] }} ] }}"#
    );

    let mut documents = HashMap::new();
    documents.insert(
        "https://karma-1.example/_federation".to_string(),
        federation.to_string(),
    );
    documents.insert(
        "https://karma-1.example/_cluster/endpoints".to_string(),
        manifest.clone(),
    );
    documents.insert(
        "https://karma-2.example/_cluster/endpoints".to_string(),
        manifest,
    );
    Arc::new(MetadataServer { documents })
}

async fn listener() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    (listener, addr)
}

fn tcp_transport() -> Arc<TcpTransport> {
    Arc::new(TcpTransport::new(TcpTransportConfig {
        name: "tcp".into(),
        priority: 1,
        connect_timeout: std::time::Duration::from_secs(2),
    }))
}

/// Test: default application on the current cluster, over real TCP
#[tokio::test]
async fn test_connect_to_default_application() {
    let (listener, addr) = listener().await;
    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut received = Vec::new();
        socket.read_to_end(&mut received).await.unwrap();
        received
    });

    let client = Client::builder()
        .http_fetcher(metadata_server(&addr))
        .default_cluster(Url::parse("https://karma-1.example").unwrap())
        .default_application(ApplicationIdentifier::new("samples", "chat"))
        .add_transport(tcp_transport())
        .build()
        .unwrap();
    let mut events = client.subscribe_connection_events();

    let connection = client.connect_to_application(None).await.unwrap();
    assert_eq!(connection.cluster_id(), "karma-1");
    assert_eq!(connection.transport_type(), "tcp");
    assert_eq!(client.connection_state("karma-1"), Some(ConnectionState::Connected));

    let mut sent = false;
    for _ in 0..50 {
        if connection.send(b"ping") {
            sent = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(sent);

    assert_eq!(events.recv().await.unwrap().kind, ConnectionEventKind::Connecting);
    assert_eq!(
        events.recv().await.unwrap().kind,
        ConnectionEventKind::Connected {
            transport: "tcp".into()
        }
    );

    client.shutdown();
    assert!(connection.is_closed());
    assert!(client.connected_clusters().is_empty());
    assert_eq!(server.await.unwrap(), b"ping");
}

/// Test: pinned applications connect to their own cluster
#[tokio::test]
async fn test_connect_to_pinned_application() {
    let (listener, addr) = listener().await;
    tokio::spawn(async move {
        let _ = listener.accept().await;
    });

    let client = Client::builder()
        .http_fetcher(metadata_server(&addr))
        .default_cluster(Url::parse("https://karma-1.example").unwrap())
        .add_transport(tcp_transport())
        .build()
        .unwrap();

    let app = ApplicationIdentifier::new("samples", "chat").on_cluster("karma-2");
    let connection = client.connect_to_application(Some(&app)).await.unwrap();
    assert_eq!(connection.cluster_id(), "karma-2");
    assert_eq!(client.connected_clusters(), vec!["karma-2"]);
}

/// Test: endpoint resolution through the client
#[tokio::test]
async fn test_resolve_endpoints() {
    let client = Client::builder()
        .http_fetcher(metadata_server("10.0.0.1:7000"))
        .default_cluster(Url::parse("https://karma-1.example").unwrap())
        .build()
        .unwrap();

    let selection = client
        .resolve_endpoints("karma-2", &["tcp".to_string(), "websocket".to_string()])
        .await
        .unwrap();
    assert_eq!(selection["tcp"], vec!["tcp://10.0.0.1:7000".to_string()]);
    assert_eq!(selection["websocket"], vec!["wss://karma.example/ws".to_string()]);

    let err = client
        .resolve_endpoints("karma-9", &["tcp".to_string()])
        .await
        .unwrap_err();
    assert_eq!(err, ClientError::cluster_not_found("karma-9"));
}

/// Test: connecting to a cluster outside the federation
#[tokio::test]
async fn test_unknown_cluster_fails_without_entry() {
    let client = Client::builder()
        .http_fetcher(metadata_server("10.0.0.1:7000"))
        .default_cluster(Url::parse("https://karma-1.example").unwrap())
        .build()
        .unwrap();

    let err = client.connect_to_cluster("karma-9").await.unwrap_err();
    assert_eq!(err, ClientError::cluster_not_found("karma-9"));
    assert_eq!(client.connection_state("karma-9"), None);
    assert!(!client.disconnect("karma-9"));
}

/// Test: without any cluster URI the client reports a configuration error
#[tokio::test]
async fn test_missing_cluster_uri() {
    let client = Client::builder()
        .http_fetcher(metadata_server("10.0.0.1:7000"))
        .config(connectivity::ClientConfig {
            cluster_uri: None,
            ..Default::default()
        })
        .build()
        .unwrap();

    let err = client.federation_metadata().await.unwrap_err();
    assert!(matches!(err, ClientError::Configuration { .. }));

    let federation = client
        .connect_to_federation(Some(Url::parse("https://karma-1.example").unwrap()))
        .await
        .unwrap();
    assert_eq!(federation.cluster_ids(), vec!["karma-1", "karma-2"]);
}
