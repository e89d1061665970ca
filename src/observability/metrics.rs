//! Metrics collection and exposition.
//!
//! # Metrics
//! - `lb_agent_rpc_requests_total` (counter): RPC calls by method, outcome
//! - `lb_agent_rpc_duration_seconds` (histogram): RPC latency by method
//! - `lb_agent_haproxy_restarts_total` (counter): restarts by outcome
//! - `lb_agent_config_validations_total` (counter): check-mode runs by outcome
//!
//! Without an installed recorder every update is a no-op, so the exporter is
//! only installed when an address is configured.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

pub const RPC_REQUESTS_TOTAL: &str = "lb_agent_rpc_requests_total";
pub const RPC_DURATION_SECONDS: &str = "lb_agent_rpc_duration_seconds";
pub const HAPROXY_RESTARTS_TOTAL: &str = "lb_agent_haproxy_restarts_total";
pub const CONFIG_VALIDATIONS_TOTAL: &str = "lb_agent_config_validations_total";

/// Install the Prometheus recorder and its scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

fn outcome(ok: bool) -> &'static str {
    if ok {
        "ok"
    } else {
        "error"
    }
}

pub fn record_rpc(method: &str, ok: bool, started: Instant) {
    let method = method.to_string();
    metrics::counter!(RPC_REQUESTS_TOTAL, "method" => method.clone(), "outcome" => outcome(ok)).increment(1);
    metrics::histogram!(RPC_DURATION_SECONDS, "method" => method).record(started.elapsed().as_secs_f64());
}

pub fn record_restart(ok: bool) {
    metrics::counter!(HAPROXY_RESTARTS_TOTAL, "outcome" => outcome(ok)).increment(1);
}

pub fn record_validation(ok: bool) {
    metrics::counter!(CONFIG_VALIDATIONS_TOTAL, "outcome" => outcome(ok)).increment(1);
}
