//! Glare station daemon
//!
//! Ties the pipeline together: sensor reading, bracketed capture, HDR
//! assembly, radiometric calibration, glare evaluation, gateway publish —
//! strictly downstream, one cycle per interval.

pub mod cycle;
pub mod settings;
pub mod workdir;

pub use cycle::{run_cycle, CycleError};
pub use settings::StationConfig;
pub use workdir::WorkDirs;

use camera_control::Camera;
use gateway_sync::{GatewaySync, GlareReport};
use lux_sensor::LuxSensor;
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Install the global tracing subscriber
pub fn init_logging() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");
}

/// Run the publish loop forever
pub async fn run(config: StationConfig) -> anyhow::Result<()> {
    let dirs = WorkDirs::create(&config.work_dir)?;
    let sensor = LuxSensor::new(config.sensor.clone());

    let camera = Camera::new(config.camera.clone());
    camera.apply_settings().await?;

    let mut gateway = GatewaySync::new(config.gateway.clone());
    gateway.connect().await?;

    let interval = Duration::from_secs(config.cycle_interval_secs);
    loop {
        let mut report = match run_cycle(&config, &dirs, &sensor, &camera).await {
            Ok(report) => report,
            Err(e) => {
                error!("capture cycle failed: {}", e);
                // Keep the gateway cadence with a sensor-only report when
                // the sensor itself still answers.
                match sensor.read_lux() {
                    Ok(lux) => GlareReport::sensor_only(&config.device, lux),
                    Err(se) => {
                        error!("sensor read failed: {}", se);
                        tokio::time::sleep(interval).await;
                        continue;
                    }
                }
            }
        };

        report.stamp(&config.device_id);
        info!(
            "cycle report: {:.1} lux, dgp {:.3}",
            report.light_lux, report.dgp
        );
        if let Err(e) = gateway.publish(&report).await {
            error!("publish failed: {}", e);
        }

        tokio::time::sleep(interval).await;
    }
}
