use std::time::Duration;
use tonic::Status;

/// Main result type for Hostwatch runtime operations
pub type HostwatchResult<T> = Result<T, HostwatchError>;

#[derive(Debug, thiserror::Error)]
pub enum HostwatchError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Deadline of {0:?} exceeded")]
    Timeout(Duration),

    #[error("Write to viewer {viewer} failed: {message}")]
    ViewerWrite { viewer: String, message: String },

    #[error("Write to viewer {viewer} timed out after {after:?}")]
    ViewerTimeout { viewer: String, after: Duration },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("gRPC transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("{0} is not implemented")]
    NotImplemented(&'static str),
}

impl HostwatchError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Determines if the error is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::ViewerTimeout { .. })
    }
}

impl From<HostwatchError> for Status {
    fn from(err: HostwatchError) -> Self {
        match &err {
            HostwatchError::Timeout(_) => Status::deadline_exceeded(err.to_string()),
            HostwatchError::NotImplemented(_) => Status::unimplemented(err.to_string()),
            HostwatchError::Config { .. } => Status::invalid_argument(err.to_string()),
            HostwatchError::Transport(_) | HostwatchError::Io(_) => {
                Status::unavailable(err.to_string())
            }
            _ => Status::internal(err.to_string()),
        }
    }
}
