//! Observability infrastructure: tracing and self-metrics.
//!
//! Call `init` (or `init_from` with the loaded config) once at startup,
//! before the first collection cycle.

use crate::config::MonitorConfig;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod metrics;

/// Initialize logging and, when `metrics_port` is set, the Prometheus exporter.
///
/// `log_level` is the default directive; `RUST_LOG` overrides it.
pub fn init(log_level: &str, metrics_port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(log_level))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true).with_level(true))
        .try_init()?;

    if let Some(port) = metrics_port {
        PrometheusBuilder::new().with_http_listener(([0, 0, 0, 0], port)).install()?;
        tracing::info!(port, "Prometheus exporter listening");
    }

    metrics::register_core_metrics();
    tracing::info!(log_level, "Observability initialized");
    Ok(())
}

/// Initialize from the `log_level` and `metrics_port` of `config`.
pub fn init_from(config: &MonitorConfig) -> Result<(), Box<dyn std::error::Error>> {
    init(&config.log_level, config.metrics_port)
}
