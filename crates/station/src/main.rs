//! Glare Station - Main Entry Point

use station::{init_logging, run, StationConfig};
use std::path::PathBuf;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    info!("=== Glare Station v{} ===", env!("CARGO_PKG_VERSION"));

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = StationConfig::load(config_path.as_deref())?;
    info!(
        "publishing as {} every {} s",
        config.device, config.cycle_interval_secs
    );

    run(config).await
}
