//! Prometheus metrics endpoint.
//!
//! Installs the global `metrics` recorder backed by the HTTP listener of
//! `metrics-exporter-prometheus`. Without it every `metrics::counter!` in the
//! engine is a no-op.

use std::net::SocketAddr;

use anyhow::Result;
use metrics_exporter_prometheus::PrometheusBuilder;

use logsniff_core::config::MetricsConfig;

/// Scrape path served by the exporter.
pub const METRICS_ENDPOINT: &str = "/metrics";

/// Socket address from `[metrics]`.
///
/// # Errors
/// - an endpoint other than [`METRICS_ENDPOINT`]
/// - an unparsable address
pub fn listen_addr(config: &MetricsConfig) -> Result<SocketAddr> {
    if config.endpoint != METRICS_ENDPOINT {
        return Err(anyhow::anyhow!(
            "unsupported metrics endpoint '{}': only '{}' is served",
            config.endpoint,
            METRICS_ENDPOINT
        ));
    }

    format!("{}:{}", config.listen_addr, config.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid metrics listen address: {}", e))
}

/// Installs the recorder and starts the listener. Once per process.
///
/// # Errors
/// - invalid `[metrics]` values
/// - the listener cannot bind or a recorder is already installed
pub fn install_metrics_recorder(config: &MetricsConfig) -> Result<()> {
    let addr = listen_addr(config)?;

    if addr.ip().is_unspecified() {
        tracing::warn!(
            listen_addr = %addr,
            "metrics endpoint listens on all interfaces"
        );
    }

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("failed to install metrics recorder: {}", e))?;

    logsniff_core::metrics::describe_all();

    tracing::info!(listen_addr = %addr, endpoint = METRICS_ENDPOINT, "metrics endpoint active");
    Ok(())
}
