//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): forwarded requests by method, outcome, transformed
//! - `proxy_request_duration_seconds` (histogram): forward + relay latency by outcome
//! - `proxy_rejected_requests_total` (counter): requests answered locally by reason
//! - `proxy_active_connections` (gauge): current connection count
//! - `proxy_server_running` (gauge): 1=running, 0=stopped
//!
//! Recording is a no-op until [`init_metrics`] installs a recorder.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// How a forwarded request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// The backend response was relayed in full.
    Relayed,
    /// Connecting to or talking with the backend failed.
    UpstreamError,
}

impl RequestOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestOutcome::Relayed => "relayed",
            RequestOutcome::UpstreamError => "upstream_error",
        }
    }
}

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_request(method: &str, outcome: RequestOutcome, transformed: bool, start: Instant) {
    metrics::counter!(
        "proxy_requests_total",
        "method" => method.to_ascii_uppercase(),
        "outcome" => outcome.as_str(),
        "transformed" => if transformed { "true" } else { "false" }
    )
    .increment(1);
    metrics::histogram!(
        "proxy_request_duration_seconds",
        "outcome" => outcome.as_str()
    )
    .record(start.elapsed().as_secs_f64());
}

pub fn record_rejected(reason: &'static str) {
    metrics::counter!("proxy_rejected_requests_total", "reason" => reason).increment(1);
}

pub fn record_active_connections(count: u64) {
    metrics::gauge!("proxy_active_connections").set(count as f64);
}

pub fn record_server_running(running: bool) {
    metrics::gauge!("proxy_server_running").set(if running { 1.0 } else { 0.0 });
}
