//! Prometheus exporter.
//!
//! Installs the `metrics-exporter-prometheus` recorder with its built-in HTTP
//! listener. Every gauge and counter recorded through the `metrics` facade
//! afterwards is served on `listen_addr:port` at `/metrics`.

use std::net::SocketAddr;

use anyhow::Result;
use lorona_core::config::MetricsConfig;
use metrics_exporter_prometheus::PrometheusBuilder;

/// Resolves the listen address, rejecting endpoints other than `/metrics`.
pub fn listen_addr(config: &MetricsConfig) -> Result<SocketAddr> {
    if config.endpoint != "/metrics" {
        return Err(anyhow::anyhow!(
            "unsupported metrics endpoint '{}': only '/metrics' is served",
            config.endpoint
        ));
    }

    format!("{}:{}", config.listen_addr, config.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid metrics listen address: {e}"))
}

/// Installs the global recorder and starts the HTTP listener.
///
/// Call once per process. Must run inside a tokio runtime.
pub fn install_metrics_recorder(config: &MetricsConfig) -> Result<()> {
    let addr = listen_addr(config)?;

    if addr.ip().is_unspecified() {
        tracing::warn!(
            listen_addr = %addr,
            "metrics endpoint is exposed on all interfaces"
        );
    }

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("failed to install metrics recorder: {e}"))?;

    lorona_core::metrics::describe_all();

    tracing::info!(listen_addr = %addr, "Prometheus metrics endpoint active");
    Ok(())
}
