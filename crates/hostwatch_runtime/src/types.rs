use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default number of rows returned by historical queries.
pub const DEFAULT_QUERY_LIMIT: i64 = 50;

/// One resource snapshot as reported by an agent.
///
/// Carries no identity or timestamp: both are assigned by the store when the
/// sample is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub source_id: String,
    #[serde(default)]
    pub tag: String,
    pub cpu_pct: f64,
    pub mem_pct: f64,
    pub disk_pct: f64,
    /// Opaque byte count; cumulative or delta is up to the agent.
    pub net_bytes: f64,
}

impl Sample {
    pub fn new(source_id: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            tag: tag.into(),
            cpu_pct: 0.0,
            mem_pct: 0.0,
            disk_pct: 0.0,
            net_bytes: 0.0,
        }
    }

    pub fn with_usage(mut self, cpu_pct: f64, mem_pct: f64, disk_pct: f64, net_bytes: f64) -> Self {
        self.cpu_pct = cpu_pct;
        self.mem_pct = mem_pct;
        self.disk_pct = disk_pct;
        self.net_bytes = net_bytes;
        self
    }

    pub fn key(&self) -> SourceKey {
        SourceKey::new(&self.source_id, &self.tag)
    }
}

/// A persisted sample with its store-assigned identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub id: i64,
    #[serde(flatten)]
    pub sample: Sample,
    pub created_at: DateTime<Utc>,
}

/// A `(source_id, tag)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceKey {
    pub source_id: String,
    pub tag: String,
}

impl SourceKey {
    pub fn new(source_id: &str, tag: &str) -> Self {
        Self {
            source_id: source_id.to_string(),
            tag: tag.to_string(),
        }
    }

    /// Composite cache key, `source_id:tag`.
    pub fn cache_key(&self) -> String {
        format!("{}:{}", self.source_id, self.tag)
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source_id, self.tag)
    }
}

/// Filter for historical retrieval. Empty strings count as absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeasurementFilter {
    pub source_id: Option<String>,
    pub tag: Option<String>,
    pub limit: Option<i64>,
}

impl MeasurementFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Limit actually applied: non-positive or missing falls back to the default.
    pub fn effective_limit(&self) -> i64 {
        match self.limit {
            Some(limit) if limit > 0 => limit,
            _ => DEFAULT_QUERY_LIMIT,
        }
    }

    /// Active `(column, value)` predicates, in a fixed order.
    pub fn predicates(&self) -> Vec<(&'static str, &str)> {
        [("source_id", self.source_id.as_deref()), ("tag", self.tag.as_deref())]
            .into_iter()
            .filter_map(|(column, value)| match value {
                Some(value) if !value.is_empty() => Some((column, value)),
                _ => None,
            })
            .collect()
    }
}

/// Frame pushed to live viewers for every accepted sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricUpdate {
    pub message: String,
    pub source_id: String,
    pub tag: String,
    pub cpu_pct: f64,
    pub mem_pct: f64,
    pub disk_pct: f64,
    pub net_bytes: f64,
    /// Unix seconds.
    pub timestamp: i64,
}

impl MetricUpdate {
    pub const MESSAGE: &'static str = "New metrics received";

    pub fn from_sample(sample: &Sample, at: DateTime<Utc>) -> Self {
        Self {
            message: Self::MESSAGE.to_string(),
            source_id: sample.source_id.clone(),
            tag: sample.tag.clone(),
            cpu_pct: sample.cpu_pct,
            mem_pct: sample.mem_pct,
            disk_pct: sample.disk_pct,
            net_bytes: sample.net_bytes,
            timestamp: at.timestamp(),
        }
    }
}
