//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_connections_total` (counter): accepted client connections
//! - `proxy_active_connections` (gauge): live handlers
//! - `proxy_requests_total` (counter): parsed requests by kind (forward/connect)
//! - `proxy_parse_failures_total` (counter): malformed request heads
//! - `proxy_dial_failures_total` (counter): failed target dials by kind
//! - `proxy_bytes_relayed_total` (counter): payload bytes by direction
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Which path a request took through the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Forward,
    Connect,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Forward => "forward",
            RequestKind::Connect => "connect",
        }
    }
}

/// Install the Prometheus exporter with an HTTP scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn connection_opened() {
    metrics::counter!("proxy_connections_total").increment(1);
    metrics::gauge!("proxy_active_connections").increment(1.0);
}

pub fn connection_closed() {
    metrics::gauge!("proxy_active_connections").decrement(1.0);
}

pub fn record_request(kind: RequestKind) {
    metrics::counter!("proxy_requests_total", "kind" => kind.as_str()).increment(1);
}

pub fn record_parse_failure() {
    metrics::counter!("proxy_parse_failures_total").increment(1);
}

pub fn record_dial_failure(kind: RequestKind) {
    metrics::counter!("proxy_dial_failures_total", "kind" => kind.as_str()).increment(1);
}

pub fn record_bytes(upstream: u64, downstream: u64) {
    metrics::counter!("proxy_bytes_relayed_total", "direction" => "upstream").increment(upstream);
    metrics::counter!("proxy_bytes_relayed_total", "direction" => "downstream").increment(downstream);
}
