//! Ringwatch - Main Entry Point

use anyhow::{anyhow, Context};
use api::{init_logging, run_server, Settings};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("failed to load configuration")?;
    init_logging(&settings.logging).map_err(|e| anyhow!("failed to initialise logging: {e}"))?;

    info!("=== Ringwatch v{} ===", env!("CARGO_PKG_VERSION"));

    let metrics = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install metrics recorder")?;

    run_server(settings, Some(metrics)).await
}
