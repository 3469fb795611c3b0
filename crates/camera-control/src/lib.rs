//! Tethered camera control
//!
//! Drives a DSLR through the gphoto2 command-line program:
//! - Fixed session settings (ISO, aperture, white balance, capture target)
//! - Lux-dependent shutter ladders for bracketed HDR capture
//! - Exposure-compensation brackets for response-curve fitting

pub mod bracket;

pub use bracket::{compensation_stops, frame_path, shutter_ladder, BRIGHT_LUX_THRESHOLD};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tool_runner::{Tool, ToolError};
use tracing::info;

/// Camera error types
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Failed to apply camera settings: {source}")]
    Settings { source: ToolError },

    #[error("Capture at shutter {shutter} failed: {source}")]
    Capture { shutter: String, source: ToolError },
}

/// Camera session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Tether program (gphoto2-compatible command line)
    pub program: String,
    /// USB port hint, e.g. "usb:001,004"; autodetected when unset
    pub port: Option<String>,
    /// Fixed ISO for every exposure
    pub iso: u32,
    /// Fixed aperture (f-number as the camera names it)
    pub aperture: String,
    /// White balance preset
    pub white_balance: String,
    /// On-camera image format; small frames keep the merge fast
    pub image_format: String,
    /// Where the camera stores frames before download
    pub capture_target: String,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            program: "gphoto2".to_string(),
            port: None,
            iso: 100,
            aperture: "8".to_string(),
            white_balance: "Daylight".to_string(),
            image_format: "Small Fine JPEG".to_string(),
            capture_target: "Internal RAM".to_string(),
        }
    }
}

/// Tethered camera session
pub struct Camera {
    config: CameraConfig,
}

impl Camera {
    /// Create a session from its configuration
    pub fn new(config: CameraConfig) -> Self {
        Self { config }
    }

    fn tool(&self) -> Tool {
        let tool = Tool::new(&self.config.program);
        match &self.config.port {
            Some(port) => tool.arg("--port").arg(port),
            None => tool,
        }
    }

    fn set_config(tool: Tool, key: &str, value: &str) -> Tool {
        tool.arg("--set-config").arg(format!("{key}={value}"))
    }

    /// Apply the fixed session settings once before capturing
    pub async fn apply_settings(&self) -> Result<(), CameraError> {
        let mut tool = self.tool();
        tool = Self::set_config(tool, "iso", &self.config.iso.to_string());
        tool = Self::set_config(tool, "aperture", &self.config.aperture);
        tool = Self::set_config(tool, "whitebalance", &self.config.white_balance);
        tool = Self::set_config(tool, "capturetarget", &self.config.capture_target);
        tool = Self::set_config(tool, "imageformat", &self.config.image_format);
        tool.run()
            .await
            .map_err(|source| CameraError::Settings { source })
    }

    /// Capture one frame at `shutter`, downloading it to `path`
    pub async fn capture_frame(&self, shutter: &str, path: &Path) -> Result<(), CameraError> {
        let tool = Self::set_config(self.tool(), "shutterspeed", shutter)
            .arg("--capture-image-and-download")
            .arg("--filename")
            .arg(path.to_string_lossy())
            .arg("--force-overwrite");
        tool.run().await.map_err(|source| CameraError::Capture {
            shutter: shutter.to_string(),
            source,
        })
    }

    /// Capture a bracketed exposure sequence into `photos_dir`, choosing the
    /// shutter ladder from the measured illuminance. Returns the frame paths
    /// in capture order.
    pub async fn capture_bracket(
        &self,
        lux: f64,
        photos_dir: &Path,
    ) -> Result<Vec<PathBuf>, CameraError> {
        let ladder = shutter_ladder(lux);
        info!("capturing {}-stop bracket at {:.1} lux", ladder.len(), lux);

        let mut frames = Vec::with_capacity(ladder.len());
        for (index, shutter) in ladder.iter().enumerate() {
            info!("shutter: {}", shutter);
            let path = frame_path(photos_dir, index);
            self.capture_frame(shutter, &path).await?;
            frames.push(path);
        }
        Ok(frames)
    }

    /// Capture one frame per exposure-compensation stop. Used when fitting a
    /// fresh camera response curve.
    pub async fn capture_compensation_bracket(
        &self,
        photos_dir: &Path,
    ) -> Result<Vec<PathBuf>, CameraError> {
        let mut frames = Vec::new();
        for stop in compensation_stops() {
            info!("exposure compensation: {:+}", stop);
            let path = photos_dir.join(format!("frame_{stop}.jpg"));
            let tool = Self::set_config(self.tool(), "exposurecompensation", &stop.to_string())
                .arg("--capture-image-and-download")
                .arg("--filename")
                .arg(path.to_string_lossy())
                .arg("--force-overwrite");
            tool.run().await.map_err(|source| CameraError::Capture {
                shutter: format!("{stop:+} EV"),
                source,
            })?;
            frames.push(path);
        }

        // Leave the camera neutral for the next session.
        Self::set_config(self.tool(), "exposurecompensation", "0")
            .run()
            .await
            .map_err(|source| CameraError::Settings { source })?;

        Ok(frames)
    }
}
