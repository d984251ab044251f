pub mod metrics_service;

pub use metrics_service::MetricsServiceImpl;

// Re-export the generated protobuf types
pub mod hostwatch {
    tonic::include_proto!("hostwatch");
}
