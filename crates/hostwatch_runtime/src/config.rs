use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::{HostwatchError, HostwatchResult};

/// Database configuration for the measurement store
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
    pub busy_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./hostwatch.db"),
            max_connections: 10,
            busy_timeout: Duration::from_secs(30),
        }
    }
}

/// Configuration for the Hostwatch server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub grpc_addr: SocketAddr,
    pub http_addr: SocketAddr,
    pub database: DatabaseConfig,
    /// Upper bound on the store write of a single report.
    pub ingest_timeout: Duration,
    /// A viewer that cannot take a frame within this window is dropped.
    pub viewer_write_timeout: Duration,
    /// Dashboard assets served for any path no route claims.
    pub web_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            grpc_addr: SocketAddr::from(([0, 0, 0, 0], 50051)),
            http_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            database: DatabaseConfig::default(),
            ingest_timeout: Duration::from_secs(5),
            viewer_write_timeout: Duration::from_secs(5),
            web_dir: None,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> HostwatchResult<()> {
        if self.ingest_timeout.is_zero() {
            return Err(HostwatchError::config("ingest_timeout must be greater than zero"));
        }
        if self.viewer_write_timeout.is_zero() {
            return Err(HostwatchError::config("viewer_write_timeout must be greater than zero"));
        }
        if self.database.max_connections == 0 {
            return Err(HostwatchError::config("database.max_connections must be at least 1"));
        }
        if let Some(dir) = &self.web_dir {
            if !dir.is_dir() {
                return Err(HostwatchError::config(format!(
                    "web_dir {} is not a directory",
                    dir.display()
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.grpc_addr.port(), 50051);
        assert_eq!(config.http_addr.port(), 8080);
    }

    #[test]
    fn test_rejects_zero_values() {
        let mut config = ServerConfig::default();
        config.ingest_timeout = Duration::ZERO;
        assert!(matches!(config.validate(), Err(HostwatchError::Config { .. })));

        let mut config = ServerConfig::default();
        config.database.max_connections = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_web_dir_must_exist() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = ServerConfig::default();
        config.web_dir = Some(dir.path().to_path_buf());
        assert!(config.validate().is_ok());

        config.web_dir = Some(dir.path().join("missing"));
        assert!(matches!(config.validate(), Err(HostwatchError::Config { .. })));
    }
}
