use chrono::{Local, NaiveDateTime};
use facetag_core::{FrameStore, StoreError};
use image::{ImageFormat, RgbImage};
use std::path::PathBuf;

/// Writes captured frames as timestamped JPEGs.
pub struct CaptureStore {
    dir: PathBuf,
}

impl CaptureStore {
    /// Create the store, making the output directory if absent.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }
}

/// `captured_YYYYMMDD_HHMMSS.jpg`
pub fn capture_file_name(at: NaiveDateTime) -> String {
    at.format("captured_%Y%m%d_%H%M%S.jpg").to_string()
}

impl FrameStore for CaptureStore {
    fn save(&self, frame: &RgbImage) -> Result<PathBuf, StoreError> {
        // The directory may have been removed while running.
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(capture_file_name(Local::now().naive_local()));
        frame.save_with_format(&path, ImageFormat::Jpeg)?;
        tracing::debug!(path = %path.display(), "capture written");
        Ok(path)
    }
}
