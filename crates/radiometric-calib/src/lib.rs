//! Radiometric calibration
//!
//! Three corrections applied in sequence to the square fisheye HDR image:
//! - Fisheye lens correction from a fixed .cal file, stamping the VIEW
//!   record needed downstream
//! - Vignetting correction from a generated .cal function centered on the
//!   lens axis
//! - Radiometric scaling against the measured illuminance, guarded so an
//!   unreliable low-light integral never produces a runaway factor

pub mod vignette;

pub use vignette::vignette_cal;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tool_runner::{Tool, ToolError};
use tracing::{info, warn};

/// Calibration error types
#[derive(Error, Debug)]
pub enum CalibError {
    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("Failed to write {path}: {source}")]
    WriteCal {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Unparseable illuminance integral {value:?}")]
    Integral { value: String },
}

/// View record stamped into the lens-corrected image and expected by the
/// glare evaluator.
pub const VIEW_RECORD: &str = "VIEW= -vta -vv 180 -vh 180";

const INSIDE_FN: &str = "inside(x,y):if(sqrt((x-xmax/2)^2+(y-ymax/2)^2)-xmax/2,0,1)";
const MASK_EXPR: &str =
    "ro=if(inside(x,y),ri(1),0);go=if(inside(x,y),gi(1),0); bo=if(inside(x,y),bi(1),0)";

/// Calibration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibConfig {
    /// Fisheye lens correction function
    pub fisheye_cal: PathBuf,
    /// Luminous-efficacy weighting used for the illuminance integral
    pub illuminance_cal: PathBuf,
    /// Fisheye center offset from the frame center, in pixels
    pub center_offset: (i32, i32),
    /// Scale factors at or above this are treated as unreliable and skipped
    pub max_scale_factor: f64,
}

impl Default for CalibConfig {
    fn default() -> Self {
        Self {
            fisheye_cal: PathBuf::from("fisheye_corr.cal"),
            illuminance_cal: PathBuf::from("illuminance_corr.cal"),
            center_offset: (-10, 5),
            max_scale_factor: 5.0,
        }
    }
}

/// A calibrated image and the scale factor applied to it, if any
#[derive(Debug, Clone)]
pub struct Calibrated {
    /// Final image of the calibration stage
    pub path: PathBuf,
    /// Radiometric scale factor, when one was applied
    pub scale: Option<f64>,
}

/// Apply the fisheye lens correction and stamp the VIEW record
pub async fn lens_correction(
    square_path: &Path,
    lens_path: &Path,
    config: &CalibConfig,
) -> Result<(), CalibError> {
    info!("Applying fisheye lens correction");
    Tool::new("pcomb")
        .arg("-f")
        .arg(config.fisheye_cal.to_string_lossy())
        .arg("-o")
        .arg(square_path.to_string_lossy())
        .pipe(Tool::new("getinfo").args(["-a", VIEW_RECORD]))
        .output_to_file(lens_path)
        .await?;
    Ok(())
}

/// Apply the generated vignetting correction function
pub async fn vignetting_correction(
    lens_path: &Path,
    corrected_path: &Path,
    config: &CalibConfig,
) -> Result<(), CalibError> {
    info!("Applying vignetting correction");
    let cal_path = corrected_path.with_file_name("vignette_corr.cal");
    tokio::fs::write(&cal_path, vignette_cal(config.center_offset))
        .await
        .map_err(|source| CalibError::WriteCal {
            path: cal_path.clone(),
            source,
        })?;

    // ra_rgbe writes the product itself, named in its arguments
    Tool::new("pcomb")
        .arg("-f")
        .arg(cal_path.to_string_lossy())
        .arg("-o")
        .arg(lens_path.to_string_lossy())
        .pipe(
            Tool::new("ra_rgbe")
                .args(["-f", "-r", "-"])
                .arg(corrected_path.to_string_lossy()),
        )
        .run()
        .await?;
    Ok(())
}

/// Integrate the image into a single illuminance value in lux
pub async fn integrated_illuminance(
    corrected_path: &Path,
    config: &CalibConfig,
) -> Result<f64, CalibError> {
    let text = Tool::new("pcomb")
        .arg("-f")
        .arg(config.illuminance_cal.to_string_lossy())
        .arg("-o")
        .arg(corrected_path.to_string_lossy())
        .pipe(Tool::new("pvalue").args(["-h", "-H", "-pG", "-df"]))
        .pipe(Tool::new("total").arg("-if"))
        .pipe(Tool::new("rcalc").args(["-e", "$1=floor($1+0.5)"]))
        .output_text()
        .await?;
    parse_integral(&text)
}

/// Parse the integral emitted by the rcalc stage
pub fn parse_integral(text: &str) -> Result<f64, CalibError> {
    let trimmed = text.trim();
    trimmed.parse::<f64>().map_err(|_| CalibError::Integral {
        value: trimmed.to_string(),
    })
}

/// Scale factor bringing the image to the measured illuminance, or None when
/// the integral is unusable
pub fn scale_factor(measured_lux: f64, integrated_lux: f64, max_factor: f64) -> Option<f64> {
    if integrated_lux <= 0.0 {
        return None;
    }
    let factor = measured_lux / integrated_lux;
    (factor < max_factor).then_some(factor)
}

/// Apply the radiometric scale with a circular mask around the fisheye
pub async fn apply_scale(
    corrected_path: &Path,
    cali_path: &Path,
    factor: f64,
) -> Result<(), CalibError> {
    Tool::new("pcomb")
        .args(["-e", INSIDE_FN])
        .args(["-e", MASK_EXPR])
        .arg("-s")
        .arg(factor.to_string())
        .arg(corrected_path.to_string_lossy())
        .pipe(Tool::new("ra_rgbe").args(["-f", "-r"]))
        .output_to_file(cali_path)
        .await?;
    Ok(())
}

/// Run the full calibration stage on a square fisheye image. Returns the
/// illuminance-scaled image, or the vignetting-corrected image when the
/// scale factor was out of range.
pub async fn calibrate(
    square_path: &Path,
    output_dir: &Path,
    measured_lux: f64,
    config: &CalibConfig,
) -> Result<Calibrated, CalibError> {
    let lens_path = output_dir.join("lens.hdr");
    let corrected_path = output_dir.join("corrected.hdr");
    let cali_path = output_dir.join("cali.hdr");

    lens_correction(square_path, &lens_path, config).await?;
    vignetting_correction(&lens_path, &corrected_path, config).await?;

    info!("Calibrating image against illuminance");
    let integrated = integrated_illuminance(&corrected_path, config).await?;
    info!(
        "camera illuminance {:.0} lux, measured {:.1} lux",
        integrated, measured_lux
    );

    match scale_factor(measured_lux, integrated, config.max_scale_factor) {
        Some(factor) => {
            apply_scale(&corrected_path, &cali_path, factor).await?;
            Ok(Calibrated {
                path: cali_path,
                scale: Some(factor),
            })
        }
        None => {
            warn!(
                "skipped illuminance scaling (integral {:.0}, max factor {})",
                integrated, config.max_scale_factor
            );
            Ok(Calibrated {
                path: corrected_path,
                scale: None,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_integral() {
        assert_eq!(parse_integral("4235\n").unwrap(), 4235.0);
        assert_eq!(parse_integral("  0 ").unwrap(), 0.0);
        assert!(matches!(
            parse_integral("n/a"),
            Err(CalibError::Integral { .. })
        ));
    }

    #[test]
    fn test_scale_factor_guard() {
        // Reasonable factor passes through
        let f = scale_factor(1000.0, 800.0, 5.0).unwrap();
        assert!((f - 1.25).abs() < 1e-9);

        // Zero or negative integral is unusable
        assert_eq!(scale_factor(1000.0, 0.0, 5.0), None);
        assert_eq!(scale_factor(1000.0, -3.0, 5.0), None);

        // Low-light blowup is rejected
        assert_eq!(scale_factor(1000.0, 100.0, 5.0), None);
    }

    #[test]
    fn test_default_config() {
        let config = CalibConfig::default();
        assert_eq!(config.center_offset, (-10, 5));
        assert!((config.max_scale_factor - 5.0).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn prop_accepted_factor_is_in_range(
            measured in 0.0f64..1.0e6,
            integrated in 1.0e-3f64..1.0e6,
        ) {
            if let Some(factor) = scale_factor(measured, integrated, 5.0) {
                prop_assert!(factor >= 0.0);
                prop_assert!(factor < 5.0);
            }
        }

        #[test]
        fn prop_nonpositive_integral_never_scales(
            measured in 0.0f64..1.0e6,
            integrated in -1.0e6f64..=0.0,
        ) {
            prop_assert_eq!(scale_factor(measured, integrated, 5.0), None);
        }
    }
}
