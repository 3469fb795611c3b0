//! Station configuration
//!
//! Layered: optional TOML file, then STATION_-prefixed environment
//! overrides. Every field has a default matching the deployed instrument so
//! a bare invocation behaves like the field unit.

use camera_control::CameraConfig;
use config::{Config, ConfigError, Environment, File};
use gateway_sync::GatewayConfig;
use hdr_assembly::AssemblyConfig;
use lux_sensor::LuxSensorConfig;
use radiometric_calib::CalibConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Station configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    /// Device name carried in the report body
    pub device: String,
    /// Hardware device id stamped into the report meta block
    pub device_id: String,
    /// Root for the photos/, hdr/ and calibrated_hdr/ working directories
    pub work_dir: PathBuf,
    /// Below this illuminance the camera stays idle and the report carries
    /// only the sensor reading
    pub capture_threshold_lux: f64,
    /// Seconds between cycle starts
    pub cycle_interval_secs: u64,
    pub sensor: LuxSensorConfig,
    pub camera: CameraConfig,
    pub assembly: AssemblyConfig,
    pub calibration: CalibConfig,
    pub gateway: GatewayConfig,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            device: "glare-station".to_string(),
            device_id: "c098e5600000".to_string(),
            work_dir: PathBuf::from("/var/lib/glare-station"),
            capture_threshold_lux: 50.0,
            cycle_interval_secs: 300,
            sensor: LuxSensorConfig::default(),
            camera: CameraConfig::default(),
            assembly: AssemblyConfig::default(),
            calibration: CalibConfig::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

impl StationConfig {
    /// Load configuration from an optional file plus the environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        builder
            .add_source(Environment::with_prefix("STATION").separator("__"))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_field_unit() {
        let config = StationConfig::default();
        assert_eq!(config.device_id, "c098e5600000");
        assert_eq!(config.capture_threshold_lux, 50.0);
        assert_eq!(config.cycle_interval_secs, 300);
        assert_eq!(config.camera.iso, 100);
        assert_eq!(config.assembly.center_offset, (-10, 5));
        assert_eq!(config.calibration.center_offset, (-10, 5));
        assert_eq!(config.gateway.topic, "gateway-data");
    }

    #[test]
    fn test_load_without_file_yields_defaults() {
        let config = StationConfig::load(None).unwrap();
        assert_eq!(config.device, "glare-station");
        assert_eq!(config.cycle_interval_secs, 300);
    }
}
