use facetag_core::DisplaySink;
use image::{ImageFormat, RgbImage};
use std::path::{Path, PathBuf};

/// Display sink that keeps the latest frame as a JPEG on disk.
///
/// Frames go to a sibling temp file first and are renamed into place, so a
/// viewer polling `path` never reads a half-written image.
pub struct PreviewSink {
    path: PathBuf,
    tmp: PathBuf,
    frames: u64,
    failing: bool,
}

impl PreviewSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        Self {
            path,
            tmp: PathBuf::from(tmp),
            frames: 0,
            failing: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, frame: &RgbImage) -> Result<(), image::ImageError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        frame.save_with_format(&self.tmp, ImageFormat::Jpeg)?;
        std::fs::rename(&self.tmp, &self.path)?;
        Ok(())
    }
}

impl DisplaySink for PreviewSink {
    fn show(&mut self, frame: &RgbImage) {
        match self.write(frame) {
            Ok(()) => {
                self.frames += 1;
                if self.failing {
                    tracing::info!(path = %self.path.display(), "preview writes recovered");
                    self.failing = false;
                }
                tracing::trace!(frame = self.frames, "preview updated");
            }
            // Warn once per failure streak rather than once per frame.
            Err(e) if !self.failing => {
                tracing::warn!(path = %self.path.display(), error = %e, "preview write failed");
                self.failing = true;
            }
            Err(e) => tracing::debug!(error = %e, "preview write failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_show_replaces_preview() {
        let tmp = tempfile::tempdir().unwrap();
        let mut sink = PreviewSink::new(tmp.path().join("out/preview.jpg"));

        sink.show(&RgbImage::new(16, 16));
        sink.show(&RgbImage::new(20, 10));

        assert_eq!(sink.frames, 2);
        let shown = image::open(sink.path()).unwrap();
        assert_eq!((shown.width(), shown.height()), (20, 10));
        assert!(!tmp.path().join("out/preview.jpg.tmp").exists());
    }

    #[test]
    fn test_show_failure_is_swallowed() {
        let tmp = tempfile::tempdir().unwrap();
        // A directory where the file should be makes the rename fail.
        let path = tmp.path().join("preview.jpg");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("keep"), b"x").unwrap();

        let mut sink = PreviewSink::new(&path);
        sink.show(&RgbImage::new(4, 4));
        sink.show(&RgbImage::new(4, 4));
        assert_eq!(sink.frames, 0);
    }
}
