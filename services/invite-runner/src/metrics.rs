//! Prometheus metrics exposition
//!
//! The pool records through the `metrics` facade:
//!
//! - `invite_outcomes_total` (counter): label `outcome`
//! - `invite_attempts_total` (counter): label `class`
//! - `invite_dispatched_total` (counter)
//!
//! Without an exporter those calls are no-ops.

use std::net::SocketAddr;

use anyhow::Context;
use metrics_exporter_prometheus::PrometheusBuilder;

/// Serve `/metrics` on `listen_addr`. Must be called inside the runtime.
pub fn install_exporter(listen_addr: SocketAddr) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(listen_addr)
        .install()
        .with_context(|| format!("failed to install Prometheus exporter on {listen_addr}"))?;
    describe();
    Ok(())
}

fn describe() {
    metrics::describe_counter!(
        "invite_outcomes_total",
        "Terminal outcomes of submission tasks and claim collisions"
    );
    metrics::describe_counter!(
        "invite_attempts_total",
        "Individual submission attempts by response class"
    );
    metrics::describe_counter!(
        "invite_dispatched_total",
        "Tokens claimed and handed to the worker pool"
    );
}
