/*!
# Hostwatch Runtime

Ingestion core of the Hostwatch host-metrics system.
Agents push resource samples over gRPC; every accepted sample updates an
in-memory latest-state cache, is appended to a SQLite log and is pushed to
live viewers over WebSocket.

## Architecture

- **Ingestion Service**: single write path (cache, store, gauges, fan-out)
- **Measurement Store**: append-only SQLite log with bound-parameter filtering
- **Latest State Cache**: most recent sample per source and tag
- **Broadcast Hub**: registry of live viewers with per-viewer write ordering
- **Query Service**: historical reads and the source directory
- **Server**: tonic gRPC and axum HTTP surfaces sharing the components above
*/

pub mod broadcast;
pub mod cache;
pub mod config;
pub mod database;
pub mod errors;
pub mod grpc;
pub mod http;
pub mod ingestion;
pub mod query;
pub mod server;
pub mod types;

// Re-export main components
pub use broadcast::{BroadcastHub, BroadcastSummary, ViewerId, ViewerSink};
pub use cache::LatestStateCache;
pub use config::{DatabaseConfig, ServerConfig};
pub use database::{MeasurementStore, SqliteMeasurementStore};
pub use errors::{HostwatchError, HostwatchResult};
pub use ingestion::{IngestionService, ReportStatus};
pub use query::{HistoricalQuery, QueryService};
pub use server::HostwatchServer;
pub use types::{Measurement, MeasurementFilter, MetricUpdate, Sample, SourceKey};

/// Runtime version
pub const RUNTIME_VERSION: &str = env!("CARGO_PKG_VERSION");
