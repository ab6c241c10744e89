//! Prometheus metrics bootstrap.

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Install the Prometheus exporter and describe the server's counters.
pub fn init_metrics(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    metrics::describe_counter!(
        "holdem_actions_admitted_total",
        "Player actions admitted through the funnel"
    );
    metrics::describe_counter!(
        "holdem_actions_rejected_total",
        "Player actions rejected with a reason"
    );
    metrics::describe_counter!(
        "holdem_ws_connections_total",
        "WebSocket connections accepted"
    );
    metrics::describe_counter!(
        "holdem_seat_requests_total",
        "Administrative seat-player requests"
    );

    Ok(())
}
