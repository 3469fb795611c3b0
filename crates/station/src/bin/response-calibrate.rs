//! Camera response-curve bracketing
//!
//! Captures an exposure-compensation bracket at the fixed session settings
//! and runs hdrgen against the configured response file so a fresh curve can
//! be fitted. Run once per camera body, not per cycle.

use camera_control::Camera;
use station::{init_logging, StationConfig, WorkDirs};
use std::path::PathBuf;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = StationConfig::load(config_path.as_deref())?;
    let dirs = WorkDirs::create(&config.work_dir)?;

    let camera = Camera::new(config.camera.clone());
    camera.apply_settings().await?;

    let frames = camera.capture_compensation_bracket(&dirs.photos).await?;
    let check_path = dirs.hdr.join("response_check.tif");
    hdr_assembly::fit_response(&frames, &config.assembly.response_file, &check_path).await?;

    info!(
        "response curve written to {}",
        config.assembly.response_file.display()
    );
    Ok(())
}
