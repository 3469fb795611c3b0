//! HDR assembly
//!
//! Merges a bracketed exposure sequence into one HDR image with hdrgen, then
//! composes a square fisheye-projected frame with ra_xyze and pcompos. The
//! image crate is used only to read the merged image's dimensions; all pixel
//! work happens in the external tools.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tool_runner::{Tool, ToolError};
use tracing::info;

/// Assembly error types
#[derive(Error, Debug)]
pub enum AssemblyError {
    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("Failed to read dimensions of {path}: {source}")]
    Dimensions {
        path: PathBuf,
        source: image::ImageError,
    },
}

/// Assembly configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblyConfig {
    /// Camera response curve consumed by hdrgen
    pub response_file: PathBuf,
    /// Fraction of the sensor height covered by the fisheye circle
    pub crop_fraction: f64,
    /// Fisheye center offset from the frame center, in pixels
    pub center_offset: (i32, i32),
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            response_file: PathBuf::from("camera_response.rsp"),
            crop_fraction: 0.850,
            center_offset: (-10, 5),
        }
    }
}

/// Side length of the square fisheye frame for a given image height
pub fn square_extent(height: u32, crop_fraction: f64) -> u32 {
    (height as f64 * crop_fraction + 0.5) as u32
}

/// Where the projected image is pasted inside the square frame
pub fn paste_position(extent: u32, center_offset: (i32, i32)) -> (i32, i32) {
    let half = (extent / 2) as i32;
    (half + center_offset.0, half + center_offset.1)
}

/// Merge bracketed frames into `hdr_path` with hdrgen
pub async fn merge_exposures(
    frames: &[PathBuf],
    response_file: &Path,
    hdr_path: &Path,
) -> Result<(), AssemblyError> {
    info!("Generating HDR image from {} frames", frames.len());
    Tool::new("hdrgen")
        .args(frames.iter().map(|f| f.to_string_lossy().to_string()))
        .arg("-F")
        .arg("-o")
        .arg(hdr_path.to_string_lossy())
        .arg("-r")
        .arg(response_file.to_string_lossy())
        .run()
        .await?;
    Ok(())
}

/// Merge a compensation bracket so hdrgen fits a response curve into
/// `response_file`. The merged check image is written to `check_path` and is
/// only useful for eyeballing the fit.
pub async fn fit_response(
    frames: &[PathBuf],
    response_file: &Path,
    check_path: &Path,
) -> Result<(), AssemblyError> {
    info!("Fitting camera response from {} frames", frames.len());
    Tool::new("hdrgen")
        .args(frames.iter().map(|f| f.to_string_lossy().to_string()))
        .arg("-o")
        .arg(check_path.to_string_lossy())
        .arg("-r")
        .arg(response_file.to_string_lossy())
        .run()
        .await?;
    Ok(())
}

/// Compose the square fisheye frame from a merged HDR image
pub async fn square_fisheye(
    hdr_path: &Path,
    square_path: &Path,
    config: &AssemblyConfig,
) -> Result<(), AssemblyError> {
    let (width, height) =
        image::image_dimensions(hdr_path).map_err(|source| AssemblyError::Dimensions {
            path: hdr_path.to_path_buf(),
            source,
        })?;

    let extent = square_extent(height, config.crop_fraction);
    let (x, y) = paste_position(extent, config.center_offset);
    info!(
        "composing {}x{} fisheye frame from {}x{} merge",
        extent, extent, width, height
    );

    Tool::new("ra_xyze")
        .args(["-r", "-o"])
        .arg(hdr_path.to_string_lossy())
        .pipe(Tool::new("pcompos").args([
            "-x".to_string(),
            extent.to_string(),
            "-y".to_string(),
            extent.to_string(),
            "=00".to_string(),
            "-".to_string(),
            x.to_string(),
            y.to_string(),
        ]))
        .output_to_file(square_path)
        .await?;
    Ok(())
}

/// Merge and project a bracket, returning the square fisheye HDR path
pub async fn assemble(
    frames: &[PathBuf],
    hdr_dir: &Path,
    config: &AssemblyConfig,
) -> Result<PathBuf, AssemblyError> {
    let hdr_path = hdr_dir.join("img.hdr");
    let square_path = hdr_dir.join("square.hdr");

    merge_exposures(frames, &config.response_file, &hdr_path).await?;
    square_fisheye(&hdr_path, &square_path, config).await?;
    Ok(square_path)
}
