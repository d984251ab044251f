use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;

use crate::config::DatabaseConfig;
use crate::errors::HostwatchResult;

pub struct ConnectionManager {
    pool: SqlitePool,
}

impl ConnectionManager {
    pub async fn new(config: &DatabaseConfig) -> HostwatchResult<Self> {
        let pool = create_pool(config).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

async fn create_pool(config: &DatabaseConfig) -> HostwatchResult<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(&config.path)
        .journal_mode(SqliteJournalMode::Wal) // readers never block the writer
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(config.busy_timeout)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(options)
        .await?;

    let start = std::time::Instant::now();
    sqlx::query("SELECT 1").fetch_one(&pool).await?;
    tracing::info!(
        "SQLite connection to {} established in {:?}",
        config.path.display(),
        start.elapsed()
    );

    Ok(pool)
}
