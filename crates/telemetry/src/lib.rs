/*!
# Telemetry

Gauges for the Hostwatch server.
Holds the last persisted value of every agent metric, labelled by
`server_id` and `tag`, and renders them in the Prometheus text format.
*/

use prometheus::core::Collector;
use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};

/// Result type for telemetry operations
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Telemetry specific errors
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("Prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
    #[error("Exposition is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

/// Label names shared by every agent gauge.
pub const AGENT_LABELS: [&str; 2] = ["server_id", "tag"];

/// Gauge vectors for the four reported resources.
///
/// Owns its own [`Registry`] so several instances (one per test, say) never
/// collide in the process-wide default registry.
pub struct AgentGauges {
    registry: Registry,
    cpu: GaugeVec,
    memory: GaugeVec,
    disk: GaugeVec,
    network: GaugeVec,
}

impl AgentGauges {
    pub fn new() -> TelemetryResult<Self> {
        let registry = Registry::new();

        let cpu = register_gauge(
            &registry,
            "agent_cpu_usage",
            "Current CPU usage (percent) from gRPC agents",
        )?;
        let memory = register_gauge(
            &registry,
            "agent_memory_usage",
            "Current memory usage (percent) from gRPC agents",
        )?;
        let disk = register_gauge(
            &registry,
            "agent_disk_usage",
            "Current disk usage (percent) from gRPC agents",
        )?;
        let network = register_gauge(
            &registry,
            "agent_network_usage",
            "Current network usage (bytes) from gRPC agents",
        )?;

        Ok(Self {
            registry,
            cpu,
            memory,
            disk,
            network,
        })
    }

    /// Overwrite the gauges of one `(server_id, tag)` pair.
    pub fn record(
        &self,
        server_id: &str,
        tag: &str,
        cpu: f64,
        memory: f64,
        disk: f64,
        network: f64,
    ) {
        let labels = [server_id, tag];
        self.cpu.with_label_values(&labels).set(cpu);
        self.memory.with_label_values(&labels).set(memory);
        self.disk.with_label_values(&labels).set(disk);
        self.network.with_label_values(&labels).set(network);
    }

    /// Current CPU gauge for a pair, if it was ever recorded.
    pub fn cpu(&self, server_id: &str, tag: &str) -> Option<f64> {
        lookup(&self.cpu, server_id, tag)
    }

    pub fn memory(&self, server_id: &str, tag: &str) -> Option<f64> {
        lookup(&self.memory, server_id, tag)
    }

    pub fn disk(&self, server_id: &str, tag: &str) -> Option<f64> {
        lookup(&self.disk, server_id, tag)
    }

    pub fn network(&self, server_id: &str, tag: &str) -> Option<f64> {
        lookup(&self.network, server_id, tag)
    }

    /// Number of labelled series across all four gauges.
    pub fn series_count(&self) -> usize {
        self.registry
            .gather()
            .iter()
            .map(|family| family.get_metric().len())
            .sum()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Text exposition of every registered gauge.
    pub fn render(&self) -> TelemetryResult<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

fn register_gauge(registry: &Registry, name: &str, help: &str) -> TelemetryResult<GaugeVec> {
    let gauge = GaugeVec::new(Opts::new(name, help), &AGENT_LABELS)?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

fn lookup(gauge: &GaugeVec, server_id: &str, tag: &str) -> Option<f64> {
    // get_metric_with_label_values would create the series; only report
    // pairs that were actually recorded.
    gauge
        .collect()
        .iter()
        .flat_map(|family| family.get_metric())
        .find(|metric| {
            let labels = metric.get_label();
            labels.iter().any(|l| l.get_name() == "server_id" && l.get_value() == server_id)
                && labels.iter().any(|l| l.get_name() == "tag" && l.get_value() == tag)
        })
        .map(|metric| metric.get_gauge().get_value())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_lookup() {
        let gauges = AgentGauges::new().unwrap();
        assert_eq!(gauges.cpu("h1", "prod"), None);

        gauges.record("h1", "prod", 42.5, 72.2, 33.1, 4096.0);
        assert_eq!(gauges.cpu("h1", "prod"), Some(42.5));
        assert_eq!(gauges.memory("h1", "prod"), Some(72.2));
        assert_eq!(gauges.disk("h1", "prod"), Some(33.1));
        assert_eq!(gauges.network("h1", "prod"), Some(4096.0));
        assert_eq!(gauges.cpu("h1", "dev"), None);

        gauges.record("h1", "prod", 10.0, 20.0, 30.0, 40.0);
        assert_eq!(gauges.cpu("h1", "prod"), Some(10.0));
        assert_eq!(gauges.series_count(), 4);
    }

    #[test]
    fn test_render_contains_labelled_series() {
        let gauges = AgentGauges::new().unwrap();
        gauges.record("web-1", "edge", 1.5, 2.5, 3.5, 4.5);

        let text = gauges.render().unwrap();
        assert!(text.contains("# HELP agent_cpu_usage"));
        assert!(text.contains(r#"agent_cpu_usage{server_id="web-1",tag="edge"} 1.5"#));
        assert!(text.contains(r#"agent_network_usage{server_id="web-1",tag="edge"} 4.5"#));
    }

    #[test]
    fn test_instances_do_not_share_series() {
        let first = AgentGauges::new().unwrap();
        let second = AgentGauges::new().unwrap();
        first.record("a", "", 1.0, 1.0, 1.0, 1.0);

        assert_eq!(first.series_count(), 4);
        assert_eq!(second.series_count(), 0);
    }
}
