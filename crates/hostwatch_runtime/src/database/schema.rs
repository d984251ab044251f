use sqlx::SqlitePool;

use crate::errors::HostwatchResult;

/// Version written to `PRAGMA user_version` once the schema is in place.
pub const SCHEMA_VERSION: i64 = 1;

/// Append-only measurement log. `created_at` defaults to the commit time as
/// RFC 3339 text with millisecond precision, so text order is time order.
pub const MEASUREMENTS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS measurements (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        source_id TEXT NOT NULL,
        tag TEXT NOT NULL DEFAULT '',
        cpu_pct REAL NOT NULL,
        mem_pct REAL NOT NULL,
        disk_pct REAL NOT NULL,
        net_bytes REAL NOT NULL,
        created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
    )
"#;

const INDEXES: [&str; 2] = [
    "CREATE INDEX IF NOT EXISTS idx_measurements_created_at ON measurements(created_at)",
    "CREATE INDEX IF NOT EXISTS idx_measurements_source_tag_time \
     ON measurements(source_id, tag, created_at)",
];

pub struct SchemaManager {
    pool: SqlitePool,
}

impl SchemaManager {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Safe to run on every boot.
    pub async fn initialize_schema(&self) -> HostwatchResult<()> {
        sqlx::query(MEASUREMENTS_TABLE).execute(&self.pool).await?;

        for index_sql in INDEXES {
            sqlx::query(index_sql).execute(&self.pool).await?;
        }

        if self.get_schema_version().await? < SCHEMA_VERSION {
            self.set_schema_version(SCHEMA_VERSION).await?;
        }

        tracing::info!("Database schema initialized (version {})", SCHEMA_VERSION);
        Ok(())
    }

    pub async fn get_schema_version(&self) -> HostwatchResult<i64> {
        let version = sqlx::query_scalar::<_, i64>("PRAGMA user_version")
            .fetch_one(&self.pool)
            .await?;
        Ok(version)
    }

    async fn set_schema_version(&self, version: i64) -> HostwatchResult<()> {
        // PRAGMA does not accept bound parameters; version is a constant.
        sqlx::query(&format!("PRAGMA user_version = {}", version))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
