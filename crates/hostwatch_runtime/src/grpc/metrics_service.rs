use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::Stream;
use tonic::metadata::MetadataMap;
use tonic::{Request, Response, Status};

use super::hostwatch::{
    metrics_service_server::MetricsService, ListMetricsRequest, ListMetricsResponse, Metric,
    MetricsRequest, MetricsResponse, StreamRequest,
};

use crate::errors::HostwatchError;
use crate::ingestion::{IngestionService, ReportStatus};
use crate::query::{HistoricalQuery, QueryService};
use crate::types::{Measurement, Sample};

const GRPC_TIMEOUT_HEADER: &str = "grpc-timeout";

/// gRPC surface over ingestion and history.
pub struct MetricsServiceImpl {
    ingestion: Arc<IngestionService>,
    query: QueryService,
}

impl MetricsServiceImpl {
    pub fn new(ingestion: Arc<IngestionService>, query: QueryService) -> Self {
        Self { ingestion, query }
    }
}

impl From<MetricsRequest> for Sample {
    fn from(req: MetricsRequest) -> Self {
        Sample {
            source_id: req.source_id,
            tag: req.tag,
            cpu_pct: req.cpu_pct,
            mem_pct: req.mem_pct,
            disk_pct: req.disk_pct,
            net_bytes: req.net_bytes,
        }
    }
}

impl From<Measurement> for Metric {
    fn from(measurement: Measurement) -> Self {
        Metric {
            id: measurement.id,
            source_id: measurement.sample.source_id,
            tag: measurement.sample.tag,
            cpu_pct: measurement.sample.cpu_pct,
            mem_pct: measurement.sample.mem_pct,
            disk_pct: measurement.sample.disk_pct,
            net_bytes: measurement.sample.net_bytes,
            created_at: measurement.created_at.to_rfc3339(),
        }
    }
}

impl From<ListMetricsRequest> for HistoricalQuery {
    fn from(req: ListMetricsRequest) -> Self {
        HistoricalQuery {
            source_id: req.source_id,
            tag: req.tag,
            limit: (req.limit > 0).then_some(req.limit),
        }
    }
}

/// Remaining budget the client sent in the `grpc-timeout` header, if any.
///
/// The value is an ASCII integer of at most eight digits followed by one unit
/// character (`H`, `M`, `S`, `m`, `u`, `n`).
pub fn request_deadline(metadata: &MetadataMap) -> Option<Duration> {
    let raw = metadata.get(GRPC_TIMEOUT_HEADER)?.to_str().ok()?;
    if raw.len() < 2 || raw.len() > 9 {
        return None;
    }
    let (digits, unit) = raw.split_at(raw.len() - 1);
    let amount: u64 = digits.parse().ok()?;

    match unit {
        "H" => Some(Duration::from_secs(amount.saturating_mul(3600))),
        "M" => Some(Duration::from_secs(amount.saturating_mul(60))),
        "S" => Some(Duration::from_secs(amount)),
        "m" => Some(Duration::from_millis(amount)),
        "u" => Some(Duration::from_micros(amount)),
        "n" => Some(Duration::from_nanos(amount)),
        _ => None,
    }
}

#[tonic::async_trait]
impl MetricsService for MetricsServiceImpl {
    type StreamMetricsStream = Pin<Box<dyn Stream<Item = Result<Metric, Status>> + Send>>;

    async fn report(
        &self,
        request: Request<MetricsRequest>,
    ) -> Result<Response<MetricsResponse>, Status> {
        let deadline = request_deadline(request.metadata());
        let sample = Sample::from(request.into_inner());

        // tonic drops this handler once the caller's deadline passes; the
        // spawned report still finishes its cache, store and broadcast steps.
        let ingestion = Arc::clone(&self.ingestion);
        let result = tokio::spawn(async move { ingestion.report(sample, deadline).await })
            .await
            .map_err(|e| Status::internal(format!("report task failed: {}", e)))?;
        let status = ReportStatus::from(&result);
        match result {
            Ok(_) => Ok(Response::new(MetricsResponse {
                status: status.to_string(),
                error: String::new(),
            })),
            Err(err) if err.is_timeout() => Err(err.into()),
            Err(err) => Ok(Response::new(MetricsResponse {
                status: status.to_string(),
                error: err.to_string(),
            })),
        }
    }

    async fn list_historical(
        &self,
        request: Request<ListMetricsRequest>,
    ) -> Result<Response<ListMetricsResponse>, Status> {
        let query = HistoricalQuery::from(request.into_inner());
        let metrics = self
            .query
            .list_historical(query)
            .await
            .map_err(|e| {
                tracing::error!("Historical query failed: {}", e);
                Status::from(e)
            })?
            .into_iter()
            .map(Metric::from)
            .collect();

        Ok(Response::new(ListMetricsResponse { metrics }))
    }

    async fn stream_metrics(
        &self,
        request: Request<StreamRequest>,
    ) -> Result<Response<Self::StreamMetricsStream>, Status> {
        tracing::debug!(
            "Rejecting StreamMetrics for source {:?}",
            request.get_ref().source_id
        );
        Err(HostwatchError::NotImplemented("StreamMetrics").into())
    }
}
