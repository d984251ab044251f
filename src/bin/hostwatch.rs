use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use hostwatch_runtime::{DatabaseConfig, HostwatchServer, ServerConfig};

/// Host metrics ingestion and live fan-out server
#[derive(Parser, Debug)]
#[clap(name = "hostwatch", version)]
struct Args {
    #[clap(
        long,
        env = "HOSTWATCH_GRPC_ADDR",
        help = "Address for the gRPC ingestion service",
        default_value = "0.0.0.0:50051"
    )]
    grpc_addr: SocketAddr,

    #[clap(
        long,
        env = "HOSTWATCH_HTTP_ADDR",
        help = "Address for the HTTP API and WebSocket live view",
        default_value = "0.0.0.0:8080"
    )]
    http_addr: SocketAddr,

    #[clap(
        long,
        env = "HOSTWATCH_DATABASE",
        help = "Path to the SQLite database file",
        default_value = "./hostwatch.db"
    )]
    database: PathBuf,

    #[clap(
        long,
        env = "HOSTWATCH_DB_MAX_CONNECTIONS",
        help = "Connection pool size",
        default_value = "10"
    )]
    db_max_connections: u32,

    #[clap(
        long,
        env = "HOSTWATCH_INGEST_TIMEOUT_MS",
        help = "Upper bound on a single report's store write",
        default_value = "5000"
    )]
    ingest_timeout_ms: u64,

    #[clap(
        long,
        env = "HOSTWATCH_VIEWER_WRITE_TIMEOUT_MS",
        help = "Drop a viewer that cannot take a frame within this window",
        default_value = "5000"
    )]
    viewer_write_timeout_ms: u64,

    #[clap(
        long,
        env = "HOSTWATCH_WEB_DIR",
        help = "Directory of dashboard assets served over HTTP"
    )]
    web_dir: Option<PathBuf>,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        ServerConfig {
            grpc_addr: args.grpc_addr,
            http_addr: args.http_addr,
            database: DatabaseConfig {
                path: args.database,
                max_connections: args.db_max_connections,
                ..Default::default()
            },
            ingest_timeout: Duration::from_millis(args.ingest_timeout_ms),
            viewer_write_timeout: Duration::from_millis(args.viewer_write_timeout_ms),
            web_dir: args.web_dir,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from(Args::parse());
    info!("Starting Hostwatch server v{}", hostwatch_runtime::RUNTIME_VERSION);

    let server = HostwatchServer::new(config)
        .await
        .context("failed to initialize server")?;
    server.serve().await.context("server terminated with an error")?;

    info!("Hostwatch server shutdown complete");
    Ok(())
}
