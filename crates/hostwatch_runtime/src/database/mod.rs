// Database Module for Hostwatch
// Durable, append-only measurement log backed by SQLite

use async_trait::async_trait;

use crate::errors::HostwatchResult;
use crate::types::{Measurement, MeasurementFilter, Sample, SourceKey};

pub mod connection;
pub mod measurements;
pub mod schema;

pub use connection::ConnectionManager;
pub use measurements::SqliteMeasurementStore;
pub use schema::SchemaManager;

/// Write/query contract of the persistent store.
///
/// Implementations must tolerate concurrent calls; the runtime adds no
/// locking of its own around them.
#[async_trait]
pub trait MeasurementStore: Send + Sync {
    /// Append one row. The store assigns `id` and `created_at`.
    async fn insert(&self, sample: &Sample) -> HostwatchResult<Measurement>;

    /// Most recent rows matching `filter`, newest first.
    async fn query(&self, filter: &MeasurementFilter) -> HostwatchResult<Vec<Measurement>>;

    /// Every `(source_id, tag)` pair ever inserted.
    async fn list_distinct_sources(&self) -> HostwatchResult<Vec<SourceKey>>;
}
