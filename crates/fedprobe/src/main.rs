//! fedprobe: inspect a federation from the command line

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use connectivity::{
    parse_cluster_uri, Client, ClientConfig, SessionId, TcpTransport, TcpTransportConfig,
};
use serde_json::json;
use tracing::info;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Entry cluster URI (overrides FEDERATION_CLUSTER_URI and the config file)
    #[arg(long, global = true)]
    cluster: Option<String>,

    /// TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Federation metadata refresh interval in seconds
    #[arg(long, global = true)]
    refresh_secs: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the federation the entry cluster belongs to
    Federation,

    /// Resolve the endpoints a cluster offers for the given transport types
    Endpoints {
        cluster_id: String,

        /// Transport type to resolve; repeatable
        #[arg(long = "transport", default_value = "tcp")]
        transports: Vec<String>,
    },

    /// Open a connection to a cluster and report how it was reached
    Connect {
        cluster_id: String,

        #[arg(long, default_value_t = 0)]
        tcp_priority: i32,
    },

    /// Mint a new session id, or decode one
    SessionId {
        #[arg(long)]
        decode: Option<String>,
    },
}

fn load_config(args: &Args) -> Result<ClientConfig> {
    let mut config = match &args.config {
        Some(path) => ClientConfig::from_toml_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ClientConfig::default(),
    };
    if let Some(uri) = &args.cluster {
        config.cluster_uri = Some(parse_cluster_uri(uri).context("Invalid --cluster")?);
    }
    if let Some(secs) = args.refresh_secs {
        config.refresh_interval = Duration::from_secs(secs);
    }
    Ok(config)
}

fn build_client(config: ClientConfig, tcp_priority: i32) -> Result<Client> {
    let tcp = TcpTransport::new(TcpTransportConfig {
        priority: tcp_priority,
        ..TcpTransportConfig::default()
    });
    Client::builder()
        .config(config)
        .add_transport(Arc::new(tcp))
        .build()
        .context("Failed to build client")
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match &args.command {
        Command::SessionId { decode } => {
            let id = match decode {
                Some(text) => text
                    .parse::<SessionId>()
                    .with_context(|| format!("Cannot decode session id '{}'", text))?,
                None => SessionId::new(),
            };
            print_json(&json!({
                "text": id.to_text(),
                "hex": hex(id.as_bytes()),
                "empty": id.is_empty(),
            }))?;
        }
        Command::Federation => {
            let client = build_client(load_config(&args)?, 0)?;
            let federation = client
                .connect_to_federation(None)
                .await
                .context("Failed to fetch federation metadata")?;
            print_json(federation.as_ref())?;
        }
        Command::Endpoints {
            cluster_id,
            transports,
        } => {
            let client = build_client(load_config(&args)?, 0)?;
            let selection = client
                .resolve_endpoints(cluster_id, transports)
                .await
                .with_context(|| format!("Failed to resolve endpoints of '{}'", cluster_id))?;
            print_json(&selection)?;
        }
        Command::Connect {
            cluster_id,
            tcp_priority,
        } => {
            let client = build_client(load_config(&args)?, *tcp_priority)?;
            let connection = client
                .connect_to_cluster(cluster_id)
                .await
                .with_context(|| format!("Failed to connect to '{}'", cluster_id))?;
            info!(cluster_id = %cluster_id, "Connection established");
            print_json(&json!({
                "cluster_id": connection.cluster_id(),
                "transport": connection.transport_name(),
                "endpoint": connection.endpoint(),
                "established_at": connection.established_at(),
            }))?;
            client.shutdown();
        }
    }

    Ok(())
}
