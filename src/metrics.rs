// ABOUTME: Prometheus exporter setup and metric descriptions.
// ABOUTME: Counters are recorded with the metrics macros where the events happen.

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Install the Prometheus scrape endpoint on `port`, if one is configured.
pub fn init_metrics(port: Option<u16>) -> Result<()> {
    let Some(port) = port else {
        return Ok(());
    };
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;
    describe();
    tracing::info!(%addr, "Metrics endpoint listening");
    Ok(())
}

fn describe() {
    metrics::describe_counter!("parley_tokens_total", "Tokens used by AI API calls");
    metrics::describe_counter!(
        "parley_relay_dropped_total",
        "Items abandoned because a relay queue was full"
    );
    metrics::describe_counter!(
        "parley_gateway_restarts_total",
        "Gateway connection restarts after non-fatal errors"
    );
    metrics::describe_counter!(
        "parley_log_events_total",
        "log_event records received by the control loop"
    );
}
