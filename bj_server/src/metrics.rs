//! Prometheus metrics, rendered by the main router's `/metrics` route.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the global recorder and return the render handle for the
/// `/metrics` route. Fails if a recorder is already installed.
pub fn install() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| format!("failed to install Prometheus recorder: {e}"))
}

/// Record one finished HTTP request.
pub fn http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    metrics::counter!("blackjack_http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("blackjack_http_requests_duration_seconds",
        "method" => method.to_string(),
        "path" => path.to_string()
    )
    .record(duration_secs);
}

/// Track requests currently executing.
pub fn http_in_flight(delta: i64) {
    metrics::gauge!("blackjack_http_requests_in_flight").increment(delta as f64);
}

/// Track connected socket clients.
pub fn connected_clients(delta: i64) {
    metrics::gauge!("blackjack_connections_active").increment(delta as f64);
}

/// Record how long a connection lived once it closes.
pub fn connection_duration(seconds: f64) {
    metrics::histogram!("blackjack_connection_duration_seconds").record(seconds);
}

/// Track living tables.
pub fn active_tables(delta: i64) {
    metrics::gauge!("blackjack_tables_active").increment(delta as f64);
}

/// Count resolved rounds.
pub fn rounds_resolved() {
    metrics::counter!("blackjack_rounds_resolved_total").increment(1);
}

/// Count frames dropped by the per-connection rate limiter.
pub fn rate_limited_frames() {
    metrics::counter!("blackjack_rate_limited_frames_total").increment(1);
}
