//! Ambient illuminance sensor
//!
//! Reads one analog input channel through the Linux IIO sysfs interface and
//! converts the voltage to a lux estimate using the photodiode amplifier's
//! divider constant.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Sensor error types
#[derive(Error, Debug)]
pub enum SensorError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Unparseable reading {value:?} from {path}")]
    Parse { path: PathBuf, value: String },
}

/// Lux per volt at the amplifier output: 3.88 V full scale over a 1.8 V
/// divider, 1000 lux per scaled volt.
pub const DEFAULT_LUX_PER_VOLT: f64 = 3.88 / 1.8 * 1000.0;

/// Sensor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LuxSensorConfig {
    /// Raw counts channel (IIO sysfs attribute)
    pub raw_path: PathBuf,
    /// Channel scale in millivolts per count (IIO sysfs attribute)
    pub scale_path: PathBuf,
    /// Conversion constant from amplifier volts to lux
    pub lux_per_volt: f64,
}

impl Default for LuxSensorConfig {
    fn default() -> Self {
        Self {
            raw_path: PathBuf::from("/sys/bus/iio/devices/iio:device0/in_voltage0_raw"),
            scale_path: PathBuf::from("/sys/bus/iio/devices/iio:device0/in_voltage_scale"),
            lux_per_volt: DEFAULT_LUX_PER_VOLT,
        }
    }
}

/// Convert an amplifier output voltage to lux
pub fn volts_to_lux(volts: f64, lux_per_volt: f64) -> f64 {
    volts * lux_per_volt
}

/// Illuminance sensor over a sysfs ADC channel
pub struct LuxSensor {
    config: LuxSensorConfig,
}

impl LuxSensor {
    /// Create a sensor from its channel configuration
    pub fn new(config: LuxSensorConfig) -> Self {
        Self { config }
    }

    /// Read the channel voltage in volts
    pub fn read_volts(&self) -> Result<f64, SensorError> {
        let raw = read_numeric(&self.config.raw_path)?;
        let scale_mv = read_numeric(&self.config.scale_path)?;
        Ok(raw * scale_mv / 1000.0)
    }

    /// Read the current illuminance estimate in lux
    pub fn read_lux(&self) -> Result<f64, SensorError> {
        let volts = self.read_volts()?;
        let lux = volts_to_lux(volts, self.config.lux_per_volt);
        debug!("sensor read: {:.3} V -> {:.1} lux", volts, lux);
        Ok(lux)
    }
}

fn read_numeric(path: &Path) -> Result<f64, SensorError> {
    let text = std::fs::read_to_string(path).map_err(|e| SensorError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;
    let trimmed = text.trim();
    trimmed.parse::<f64>().map_err(|_| SensorError::Parse {
        path: path.to_path_buf(),
        value: trimmed.to_string(),
    })
}
