//! One capture-and-evaluate cycle
//!
//! Strictly sequential: each stage blocks on the previous one. Below the
//! capture threshold the cycle is just the sensor reading.

use crate::settings::StationConfig;
use crate::workdir::WorkDirs;
use camera_control::{Camera, CameraError};
use gateway_sync::GlareReport;
use glare_eval::GlareError;
use hdr_assembly::AssemblyError;
use lux_sensor::{LuxSensor, SensorError};
use radiometric_calib::CalibError;
use thiserror::Error;
use tracing::{debug, info};

/// Failures of individual cycle stages
#[derive(Error, Debug)]
pub enum CycleError {
    #[error("sensor: {0}")]
    Sensor(#[from] SensorError),

    #[error("camera: {0}")]
    Camera(#[from] CameraError),

    #[error("assembly: {0}")]
    Assembly(#[from] AssemblyError),

    #[error("calibration: {0}")]
    Calibration(#[from] CalibError),

    #[error("glare evaluation: {0}")]
    Glare(#[from] GlareError),
}

/// Run one cycle and build its report (meta block not yet stamped)
pub async fn run_cycle(
    config: &StationConfig,
    dirs: &WorkDirs,
    sensor: &LuxSensor,
    camera: &Camera,
) -> Result<GlareReport, CycleError> {
    let lux = sensor.read_lux()?;
    info!("Measured illuminance: {:.1} lux", lux);

    let report = GlareReport::sensor_only(&config.device, lux);
    if lux <= config.capture_threshold_lux {
        debug!("below capture threshold, camera stays idle");
        return Ok(report);
    }

    let frames = camera.capture_bracket(lux, &dirs.photos).await?;

    // Second reading bracketing the capture, averaged with the first
    let lux = (lux + sensor.read_lux()?) / 2.0;

    let square = hdr_assembly::assemble(&frames, &dirs.hdr, &config.assembly).await?;
    let calibrated =
        radiometric_calib::calibrate(&square, &dirs.calibrated, lux, &config.calibration).await?;
    if let Some(scale) = calibrated.scale {
        info!("applied radiometric scale {:.3}", scale);
    }

    let metrics = glare_eval::evaluate(&calibrated.path, lux, &dirs.calibrated).await?;
    Ok(report.with_metrics(lux, metrics))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lux_sensor::LuxSensorConfig;
    use std::io::Write;
    use std::path::PathBuf;

    fn scratch_sensor(name: &str, raw: &str, scale_mv: &str) -> LuxSensorConfig {
        let dir = std::env::temp_dir().join(format!("station-cycle-{}-{}", std::process::id(), name));
        std::fs::create_dir_all(&dir).unwrap();
        let raw_path = dir.join("in_voltage0_raw");
        let scale_path = dir.join("in_voltage_scale");
        write!(std::fs::File::create(&raw_path).unwrap(), "{raw}").unwrap();
        write!(std::fs::File::create(&scale_path).unwrap(), "{scale_mv}").unwrap();
        LuxSensorConfig {
            raw_path,
            scale_path,
            ..Default::default()
        }
    }

    fn scratch_dirs(name: &str) -> WorkDirs {
        let root = std::env::temp_dir().join(format!("station-cycle-dirs-{}-{}", std::process::id(), name));
        WorkDirs::create(&root).unwrap()
    }

    #[tokio::test]
    async fn test_dim_cycle_reports_sensor_only() {
        // 10 counts at 1 mV each is about 0.02 lux, far below threshold
        let mut config = StationConfig::default();
        config.sensor = scratch_sensor("dim", "10", "1.0");
        let sensor = LuxSensor::new(config.sensor.clone());
        let camera = Camera::new(config.camera.clone());
        let dirs = scratch_dirs("dim");

        let report = run_cycle(&config, &dirs, &sensor, &camera).await.unwrap();
        assert!(report.light_lux < 50.0);
        assert_eq!(report.dgp, 0.0);
        assert_eq!(report.device, "glare-station");
    }

    #[tokio::test]
    async fn test_bright_cycle_fails_on_missing_camera() {
        // 2000 counts at 1 mV each is about 4311 lux, above threshold
        let mut config = StationConfig::default();
        config.sensor = scratch_sensor("bright", "2000", "1.0");
        config.camera.program = "no-such-tether-program".to_string();
        let sensor = LuxSensor::new(config.sensor.clone());
        let camera = Camera::new(config.camera.clone());
        let dirs = scratch_dirs("bright");

        let err = run_cycle(&config, &dirs, &sensor, &camera)
            .await
            .unwrap_err();
        assert!(matches!(err, CycleError::Camera(_)));
    }

    #[tokio::test]
    async fn test_broken_sensor_fails_the_cycle() {
        let mut config = StationConfig::default();
        config.sensor.raw_path = PathBuf::from("/nonexistent/in_voltage0_raw");
        let sensor = LuxSensor::new(config.sensor.clone());
        let camera = Camera::new(config.camera.clone());
        let dirs = scratch_dirs("broken");

        let err = run_cycle(&config, &dirs, &sensor, &camera)
            .await
            .unwrap_err();
        assert!(matches!(err, CycleError::Sensor(_)));
    }
}
