use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use crate::config::DatabaseConfig;
use crate::database::connection::ConnectionManager;
use crate::database::schema::SchemaManager;
use crate::database::MeasurementStore;
use crate::errors::HostwatchResult;
use crate::types::{Measurement, MeasurementFilter, Sample, SourceKey};

const SELECT_MEASUREMENTS: &str = "SELECT id, source_id, tag, cpu_pct, mem_pct, disk_pct, \
     net_bytes, created_at FROM measurements";

/// SQLite implementation of [`MeasurementStore`].
pub struct SqliteMeasurementStore {
    pool: SqlitePool,
}

impl SqliteMeasurementStore {
    /// Open (creating if needed) the database file and make sure the schema exists.
    pub async fn open(config: &DatabaseConfig) -> HostwatchResult<Self> {
        let connection = ConnectionManager::new(config).await?;
        Self::from_pool(connection.pool().clone()).await
    }

    pub async fn from_pool(pool: SqlitePool) -> HostwatchResult<Self> {
        SchemaManager::new(pool.clone()).initialize_schema().await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Build the historical query for `filter`.
///
/// Each predicate pushes its clause and its bound value in the same step, so
/// placeholders and arguments cannot drift apart however many filters are
/// active. Column names come from a fixed list; caller input is only ever
/// bound.
pub fn history_query(filter: &MeasurementFilter) -> QueryBuilder<'static, Sqlite> {
    let mut builder = QueryBuilder::new(SELECT_MEASUREMENTS);

    for (index, (column, value)) in filter.predicates().into_iter().enumerate() {
        builder.push(if index == 0 { " WHERE " } else { " AND " });
        builder.push(column).push(" = ").push_bind(value.to_string());
    }

    builder
        .push(" ORDER BY created_at DESC, id DESC LIMIT ")
        .push_bind(filter.effective_limit());
    builder
}

fn measurement_from_row(row: &SqliteRow) -> HostwatchResult<Measurement> {
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    Ok(Measurement {
        id: row.try_get("id")?,
        sample: Sample {
            source_id: row.try_get("source_id")?,
            tag: row.try_get("tag")?,
            cpu_pct: row.try_get("cpu_pct")?,
            mem_pct: row.try_get("mem_pct")?,
            disk_pct: row.try_get("disk_pct")?,
            net_bytes: row.try_get("net_bytes")?,
        },
        created_at,
    })
}

#[async_trait]
impl MeasurementStore for SqliteMeasurementStore {
    async fn insert(&self, sample: &Sample) -> HostwatchResult<Measurement> {
        let row = sqlx::query(
            r#"
            INSERT INTO measurements (source_id, tag, cpu_pct, mem_pct, disk_pct, net_bytes)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id, created_at
        "#,
        )
        .bind(&sample.source_id)
        .bind(&sample.tag)
        .bind(sample.cpu_pct)
        .bind(sample.mem_pct)
        .bind(sample.disk_pct)
        .bind(sample.net_bytes)
        .fetch_one(&self.pool)
        .await?;

        let measurement = Measurement {
            id: row.try_get("id")?,
            sample: sample.clone(),
            created_at: row.try_get("created_at")?,
        };

        tracing::debug!("Stored measurement {} for {}", measurement.id, sample.key());
        Ok(measurement)
    }

    async fn query(&self, filter: &MeasurementFilter) -> HostwatchResult<Vec<Measurement>> {
        let mut builder = history_query(filter);
        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(measurement_from_row).collect()
    }

    async fn list_distinct_sources(&self) -> HostwatchResult<Vec<SourceKey>> {
        let pairs: Vec<(String, String)> = sqlx::query_as(
            "SELECT DISTINCT source_id, tag FROM measurements ORDER BY source_id, tag",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(pairs
            .into_iter()
            .map(|(source_id, tag)| SourceKey { source_id, tag })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::NamedTempFile;

    async fn open_store() -> (SqliteMeasurementStore, NamedTempFile) {
        let temp_file = NamedTempFile::new().unwrap();
        let config = DatabaseConfig {
            path: temp_file.path().to_path_buf(),
            ..Default::default()
        };
        let store = SqliteMeasurementStore::open(&config).await.unwrap();
        (store, temp_file)
    }

    fn sample(source_id: &str, tag: &str, cpu: f64) -> Sample {
        Sample::new(source_id, tag).with_usage(cpu, 50.0, 25.0, 1024.0)
    }

    #[test]
    fn test_history_query_placeholders_follow_filters() {
        let none = history_query(&MeasurementFilter::new());
        assert_eq!(
            none.sql(),
            format!("{} ORDER BY created_at DESC, id DESC LIMIT ?", SELECT_MEASUREMENTS)
        );

        let tag_only = history_query(&MeasurementFilter::new().tag("prod"));
        assert_eq!(
            tag_only.sql(),
            format!(
                "{} WHERE tag = ? ORDER BY created_at DESC, id DESC LIMIT ?",
                SELECT_MEASUREMENTS
            )
        );

        let both = history_query(&MeasurementFilter::new().source_id("h1").tag("prod").limit(3));
        assert_eq!(
            both.sql(),
            format!(
                "{} WHERE source_id = ? AND tag = ? ORDER BY created_at DESC, id DESC LIMIT ?",
                SELECT_MEASUREMENTS
            )
        );
    }

    #[test]
    fn test_history_query_never_inlines_values() {
        let hostile = "h1' OR '1'='1";
        let builder = history_query(&MeasurementFilter::new().source_id(hostile));
        assert!(!builder.sql().contains(hostile));
    }

    #[tokio::test]
    async fn test_insert_assigns_id_and_timestamp() {
        let (store, _file) = open_store().await;

        let before = Utc::now() - chrono::Duration::seconds(1);
        let first = store.insert(&sample("h1", "prod", 42.5)).await.unwrap();
        let second = store.insert(&sample("h1", "prod", 43.5)).await.unwrap();

        assert!(second.id > first.id);
        assert!(first.created_at >= before);
        assert_eq!(first.sample, sample("h1", "prod", 42.5));

        store.close().await;
    }

    #[tokio::test]
    async fn test_query_filters_and_orders() {
        let (store, _file) = open_store().await;

        for (source, tag, cpu) in [
            ("h1", "prod", 1.0),
            ("h1", "dev", 2.0),
            ("h2", "prod", 3.0),
            ("h1", "prod", 4.0),
        ] {
            store.insert(&sample(source, tag, cpu)).await.unwrap();
        }

        let both = store
            .query(&MeasurementFilter::new().source_id("h1").tag("prod"))
            .await
            .unwrap();
        assert_eq!(both.len(), 2);
        assert!(both.iter().all(|m| m.sample.source_id == "h1" && m.sample.tag == "prod"));
        // newest first
        assert_eq!(both[0].sample.cpu_pct, 4.0);
        assert_eq!(both[1].sample.cpu_pct, 1.0);

        let by_tag = store.query(&MeasurementFilter::new().tag("prod")).await.unwrap();
        assert_eq!(by_tag.len(), 3);

        let all = store.query(&MeasurementFilter::new()).await.unwrap();
        assert_eq!(all.len(), 4);
        for pair in all.windows(2) {
            assert!(pair[0].created_at >= pair[1].created_at);
            if pair[0].created_at == pair[1].created_at {
                assert!(pair[0].id > pair[1].id);
            }
        }

        let empty_strings = store
            .query(&MeasurementFilter::new().source_id("").tag(""))
            .await
            .unwrap();
        assert_eq!(empty_strings.len(), 4);

        store.close().await;
    }

    #[tokio::test]
    async fn test_query_respects_limit() {
        let (store, _file) = open_store().await;
        for i in 0..60 {
            store.insert(&sample("h1", "", i as f64)).await.unwrap();
        }

        let limited = store.query(&MeasurementFilter::new().limit(5)).await.unwrap();
        assert_eq!(limited.len(), 5);
        assert_eq!(limited[0].sample.cpu_pct, 59.0);

        let defaulted = store.query(&MeasurementFilter::new().limit(0)).await.unwrap();
        assert_eq!(defaulted.len(), 50);

        store.close().await;
    }

    #[tokio::test]
    async fn test_hostile_filter_value_is_bound() {
        let (store, _file) = open_store().await;
        store.insert(&sample("h1", "prod", 1.0)).await.unwrap();

        let rows = store
            .query(&MeasurementFilter::new().source_id("h1' OR '1'='1"))
            .await
            .unwrap();
        assert!(rows.is_empty());

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM measurements")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);

        store.close().await;
    }

    #[tokio::test]
    async fn test_distinct_sources_are_unique_and_stable() {
        let (store, _file) = open_store().await;
        for (source, tag) in [("h2", "prod"), ("h1", "prod"), ("h1", ""), ("h2", "prod")] {
            store.insert(&sample(source, tag, 1.0)).await.unwrap();
        }

        let first = store.list_distinct_sources().await.unwrap();
        let second = store.list_distinct_sources().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(
            first,
            vec![
                SourceKey::new("h1", ""),
                SourceKey::new("h1", "prod"),
                SourceKey::new("h2", "prod"),
            ]
        );

        store.close().await;
    }

    #[tokio::test]
    async fn test_concurrent_inserts_keep_every_row() {
        let (store, _file) = open_store().await;
        let store = Arc::new(store);

        let mut handles = Vec::new();
        for i in 0..20 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.insert(&sample(&format!("h{}", i % 4), "load", i as f64)).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let rows = store.query(&MeasurementFilter::new().limit(100)).await.unwrap();
        assert_eq!(rows.len(), 20);

        store.close().await;
    }
}
