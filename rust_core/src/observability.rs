//! Tracing and metrics bootstrap for the engine services.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::EnvFilter;

/// Initialise the fmt subscriber with an env-driven filter. `log` records
/// from service code are captured through the tracing-log bridge.
pub fn init_tracing(service_name: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{service_name}=info,winprob_core=info,info")));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

/// Install the Prometheus recorder with an HTTP scrape listener. The engine
/// publishes its counters/histograms here; the rolling-quality gauges the
/// guardrail consumes live on the external aggregator's endpoint.
pub fn init_metrics(listen: SocketAddr) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(listen)
        .install()
        .context("install prometheus recorder")
}
