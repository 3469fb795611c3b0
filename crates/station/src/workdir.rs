//! Working directory bookkeeping
//!
//! Each cycle leaves its intermediates on disk, overwritten next cycle:
//! bracketed JPEGs under photos/, merge products under hdr/, calibration
//! products under calibrated_hdr/.

use std::path::{Path, PathBuf};

/// Working directories under the configured root
#[derive(Debug, Clone)]
pub struct WorkDirs {
    pub photos: PathBuf,
    pub hdr: PathBuf,
    pub calibrated: PathBuf,
}

impl WorkDirs {
    /// Create the directory tree under `root`
    pub fn create(root: &Path) -> std::io::Result<Self> {
        let dirs = Self {
            photos: root.join("photos"),
            hdr: root.join("hdr"),
            calibrated: root.join("calibrated_hdr"),
        };
        for dir in [&dirs.photos, &dirs.hdr, &dirs.calibrated] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(dirs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_creates_all_three_directories() {
        let root = std::env::temp_dir().join(format!("station-workdir-{}", std::process::id()));
        let dirs = WorkDirs::create(&root).unwrap();

        assert!(dirs.photos.is_dir());
        assert!(dirs.hdr.is_dir());
        assert!(dirs.calibrated.is_dir());
        assert!(dirs.calibrated.ends_with("calibrated_hdr"));

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn test_create_is_idempotent() {
        let root = std::env::temp_dir().join(format!("station-workdir-2-{}", std::process::id()));
        WorkDirs::create(&root).unwrap();
        WorkDirs::create(&root).unwrap();
        std::fs::remove_dir_all(&root).unwrap();
    }
}
