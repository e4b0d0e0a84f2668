// metrics/mod.rs
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

pub fn setup_metrics(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to setup metrics: {}", e))?;
    describe();
    Ok(())
}

fn describe() {
    metrics::describe_counter!(
        "device_frames_received_total",
        "Text frames read by device receive loops"
    );
    metrics::describe_counter!(
        "device_transitions_applied_total",
        "On/off transitions handed to device handlers"
    );
    metrics::describe_counter!(
        "device_connect_failures_total",
        "Failed device handshakes"
    );
    metrics::describe_counter!(
        "relay_messages_routed_total",
        "Messages forwarded by the relay"
    );
    metrics::describe_counter!(
        "relay_messages_dropped_total",
        "Messages dropped because the target queue was full"
    );
    metrics::describe_gauge!(
        "relay_active_connections",
        "Clients currently registered with the relay"
    );
}
