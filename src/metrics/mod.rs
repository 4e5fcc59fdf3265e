// metrics/mod.rs
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

pub fn setup_metrics(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to setup metrics: {}", e))
}

pub fn record_command(brand: &str, outcome: &'static str, elapsed: Duration) {
    metrics::counter!("device_commands_total", "brand" => brand.to_string(), "outcome" => outcome)
        .increment(1);
    metrics::histogram!("device_command_duration_seconds", "brand" => brand.to_string())
        .record(elapsed.as_secs_f64());
}

pub fn record_persist_failure() {
    metrics::counter!("registry_persist_failures_total").increment(1);
}
