use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use telemetry::AgentGauges;

use crate::broadcast::BroadcastHub;
use crate::cache::LatestStateCache;
use crate::database::MeasurementStore;
use crate::errors::{HostwatchError, HostwatchResult};
use crate::types::{Measurement, MetricUpdate, Sample};

/// Wire status returned to reporting agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportStatus {
    Ok,
    DbError,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Ok => "OK",
            ReportStatus::DbError => "DB Error",
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<T> From<&HostwatchResult<T>> for ReportStatus {
    fn from(result: &HostwatchResult<T>) -> Self {
        match result {
            Ok(_) => ReportStatus::Ok,
            Err(_) => ReportStatus::DbError,
        }
    }
}

/// Single write path: cache, store, gauges, then live fan-out.
///
/// Not transactional. The cache update and the broadcast happen whether or
/// not the store write succeeds; live viewers see a sample even when it never
/// becomes durable.
pub struct IngestionService {
    cache: Arc<LatestStateCache>,
    store: Arc<dyn MeasurementStore>,
    hub: Arc<BroadcastHub>,
    gauges: Arc<AgentGauges>,
    max_deadline: Duration,
}

impl IngestionService {
    pub fn new(
        cache: Arc<LatestStateCache>,
        store: Arc<dyn MeasurementStore>,
        hub: Arc<BroadcastHub>,
        gauges: Arc<AgentGauges>,
        max_deadline: Duration,
    ) -> Self {
        Self {
            cache,
            store,
            hub,
            gauges,
            max_deadline,
        }
    }

    /// Accept one sample.
    ///
    /// `deadline` is the caller's remaining budget; it is capped by the
    /// configured ingest timeout and bounds the store write.
    pub async fn report(
        &self,
        sample: Sample,
        deadline: Option<Duration>,
    ) -> HostwatchResult<Measurement> {
        let deadline = deadline.map_or(self.max_deadline, |d| d.min(self.max_deadline));

        tracing::info!(
            "Received metrics: host={}, tag={}, CPU={:.2}, MEM={:.2}, DISK={:.2}, NET={:.2}",
            sample.source_id,
            sample.tag,
            sample.cpu_pct,
            sample.mem_pct,
            sample.disk_pct,
            sample.net_bytes
        );

        self.cache.upsert(sample.clone());

        let stored = match tokio::time::timeout(deadline, self.store.insert(&sample)).await {
            Ok(result) => result,
            Err(_) => Err(HostwatchError::Timeout(deadline)),
        };

        let broadcast_at = match &stored {
            Ok(measurement) => {
                self.gauges.record(
                    &sample.source_id,
                    &sample.tag,
                    sample.cpu_pct,
                    sample.mem_pct,
                    sample.disk_pct,
                    sample.net_bytes,
                );
                measurement.created_at
            }
            Err(err) => {
                tracing::error!("DB insert error for {}: {}", sample.key(), err);
                Utc::now()
            }
        };

        let update = MetricUpdate::from_sample(&sample, broadcast_at);
        if let Err(err) = self.hub.broadcast(&update).await {
            tracing::error!("Broadcast for {} failed: {}", sample.key(), err);
        }

        stored
    }

    pub fn cache(&self) -> &Arc<LatestStateCache> {
        &self.cache
    }

    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    pub fn gauges(&self) -> &Arc<AgentGauges> {
        &self.gauges
    }
}
