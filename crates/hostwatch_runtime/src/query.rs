use std::sync::Arc;

use crate::database::MeasurementStore;
use crate::errors::HostwatchResult;
use crate::types::{Measurement, MeasurementFilter, SourceKey};

/// Caller-facing history request. Empty strings mean "no filter".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoricalQuery {
    pub source_id: String,
    pub tag: String,
    pub limit: Option<i64>,
}

impl From<HistoricalQuery> for MeasurementFilter {
    fn from(query: HistoricalQuery) -> Self {
        let non_empty = |value: String| if value.is_empty() { None } else { Some(value) };
        MeasurementFilter {
            source_id: non_empty(query.source_id),
            tag: non_empty(query.tag),
            limit: query.limit,
        }
    }
}

/// Read side over the persistent store.
#[derive(Clone)]
pub struct QueryService {
    store: Arc<dyn MeasurementStore>,
}

impl QueryService {
    pub fn new(store: Arc<dyn MeasurementStore>) -> Self {
        Self { store }
    }

    /// Newest-first history for the requested source and tag.
    pub async fn list_historical(
        &self,
        query: HistoricalQuery,
    ) -> HostwatchResult<Vec<Measurement>> {
        let filter = MeasurementFilter::from(query);
        tracing::debug!(
            "Historical query: source_id={:?}, tag={:?}, limit={}",
            filter.source_id,
            filter.tag,
            filter.effective_limit()
        );
        self.store.query(&filter).await
    }

    pub async fn list_sources(&self) -> HostwatchResult<Vec<SourceKey>> {
        self.store.list_distinct_sources().await
    }
}
