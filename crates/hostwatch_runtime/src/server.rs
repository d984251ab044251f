use axum::Router;
use std::future::Future;
use std::sync::Arc;
use telemetry::AgentGauges;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tracing::{error, info};

use crate::broadcast::BroadcastHub;
use crate::cache::LatestStateCache;
use crate::config::ServerConfig;
use crate::database::{MeasurementStore, SqliteMeasurementStore};
use crate::errors::{HostwatchError, HostwatchResult};
use crate::grpc::hostwatch::metrics_service_server::MetricsServiceServer;
use crate::grpc::MetricsServiceImpl;
use crate::http::{create_router, HttpState};
use crate::ingestion::IngestionService;
use crate::query::QueryService;

/// Main Hostwatch server: gRPC ingestion plus the HTTP read and live-view
/// surface, sharing one store, cache, hub and gauge set.
pub struct HostwatchServer {
    config: ServerConfig,
    store: Arc<SqliteMeasurementStore>,
    ingestion: Arc<IngestionService>,
    query: QueryService,
}

impl HostwatchServer {
    /// Open the store and wire every component together.
    pub async fn new(config: ServerConfig) -> HostwatchResult<Self> {
        config.validate()?;
        info!("Initializing Hostwatch server");

        let store = Arc::new(SqliteMeasurementStore::open(&config.database).await?);
        info!("Database initialized at: {}", config.database.path.display());

        let gauges = Arc::new(AgentGauges::new()?);
        let cache = Arc::new(LatestStateCache::new());
        let hub = Arc::new(BroadcastHub::new(config.viewer_write_timeout));

        let dyn_store: Arc<dyn MeasurementStore> = store.clone();
        let ingestion = Arc::new(IngestionService::new(
            cache,
            Arc::clone(&dyn_store),
            hub,
            gauges,
            config.ingest_timeout,
        ));
        let query = QueryService::new(dyn_store);

        Ok(Self {
            config,
            store,
            ingestion,
            query,
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn ingestion(&self) -> &Arc<IngestionService> {
        &self.ingestion
    }

    pub fn router(&self) -> Router {
        create_router(Arc::new(HttpState {
            query: self.query.clone(),
            cache: Arc::clone(self.ingestion.cache()),
            hub: Arc::clone(self.ingestion.hub()),
            gauges: Arc::clone(self.ingestion.gauges()),
            web_dir: self.config.web_dir.clone(),
        }))
    }

    pub fn grpc_service(&self) -> MetricsServiceServer<MetricsServiceImpl> {
        MetricsServiceServer::new(MetricsServiceImpl::new(
            Arc::clone(&self.ingestion),
            self.query.clone(),
        ))
    }

    /// Bind the configured addresses and run until Ctrl-C.
    pub async fn serve(self) -> HostwatchResult<()> {
        let grpc = TcpListener::bind(self.config.grpc_addr).await?;
        let http = TcpListener::bind(self.config.http_addr).await?;

        self.serve_with_listeners(grpc, http, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Run both surfaces on pre-bound listeners until `shutdown` resolves or
    /// either server fails. The store is closed on the way out.
    pub async fn serve_with_listeners<F>(
        self,
        grpc_listener: TcpListener,
        http_listener: TcpListener,
        shutdown: F,
    ) -> HostwatchResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!("gRPC server listening on: {}", grpc_listener.local_addr()?);
        info!("HTTP/WebSocket server listening on: {}", http_listener.local_addr()?);

        let (stop_tx, stop_rx) = watch::channel(false);
        let mut grpc_stop = stop_rx.clone();
        let mut http_stop = stop_rx;

        let signal = tokio::spawn(async move {
            shutdown.await;
            info!("Received shutdown signal, stopping servers");
            let _ = stop_tx.send(true);
        });

        let grpc = async {
            Server::builder()
                .add_service(self.grpc_service())
                .serve_with_incoming_shutdown(TcpListenerStream::new(grpc_listener), async move {
                    let _ = grpc_stop.changed().await;
                })
                .await
                .map_err(HostwatchError::from)
        };

        let http = async {
            axum::serve(http_listener, self.router())
                .with_graceful_shutdown(async move {
                    let _ = http_stop.changed().await;
                })
                .await
                .map_err(HostwatchError::from)
        };

        let result = tokio::try_join!(grpc, http).map(|_| ());
        signal.abort();

        match &result {
            Ok(()) => info!("Hostwatch server shut down gracefully"),
            Err(e) => error!("Server error: {}", e),
        }

        self.store.close().await;
        info!("Database closed");
        result
    }
}
