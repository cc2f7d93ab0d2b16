//! Prometheus metrics.
//!
//! # Metrics
//! - `reconfig_volume_events_total{outcome}`: filtered, handled or dropped
//! - `reconfig_handler_attempts_total{result}`: each handler invocation
//! - `reconfig_policy_invocations_total{policy,status}`
//! - `reconfig_online_updates_total{result}`

use std::net::SocketAddr;

use axum::{routing::get, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info};

/// Install the recorder and serve `/metrics` on `addr`.
pub async fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| format!("failed to install metrics recorder: {e}"))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("failed to bind metrics listener {addr}: {e}"))?;

    let app = Router::new().route("/metrics", get(move || async move { handle.render() }));
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "metrics server stopped");
        }
    });
    info!(address = %addr, "metrics endpoint listening");
    Ok(())
}

pub fn record_volume_event(outcome: &'static str) {
    ::metrics::counter!("reconfig_volume_events_total", "outcome" => outcome).increment(1);
}

pub fn record_handler_attempt(success: bool) {
    let result = if success { "ok" } else { "error" };
    ::metrics::counter!("reconfig_handler_attempts_total", "result" => result).increment(1);
}

pub fn record_policy_invocation(policy: &'static str, status: &'static str) {
    ::metrics::counter!("reconfig_policy_invocations_total", "policy" => policy, "status" => status).increment(1);
}

pub fn record_online_update(success: bool) {
    let result = if success { "ok" } else { "error" };
    ::metrics::counter!("reconfig_online_updates_total", "result" => result).increment(1);
}
