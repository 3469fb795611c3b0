//! Bracket planning: shutter ladders and frame naming

use std::path::{Path, PathBuf};

/// Above this illuminance the long-exposure tail of the ladder saturates and
/// is skipped.
pub const BRIGHT_LUX_THRESHOLD: f64 = 1200.0;

const BRIGHT_LADDER: [&str; 7] = ["1/8000", "1/2000", "1/500", "1/125", "1/30", "1/8", "0.5"];

const DIM_LADDER: [&str; 9] = [
    "1/8000", "1/2000", "1/500", "1/125", "1/30", "1/8", "0.5", "2", "8",
];

/// Shutter speeds to bracket at the given illuminance, fastest first
pub fn shutter_ladder(lux: f64) -> &'static [&'static str] {
    if lux > BRIGHT_LUX_THRESHOLD {
        &BRIGHT_LADDER
    } else {
        &DIM_LADDER
    }
}

/// Exposure-compensation stops for response-curve brackets
pub fn compensation_stops() -> impl Iterator<Item = i32> {
    (-4..=4).step_by(2)
}

/// Path of the `index`-th frame of a bracket
pub fn frame_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!("frame_{index}.jpg"))
}
