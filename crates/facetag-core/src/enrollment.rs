//! One-shot capture-and-enroll.

use crate::pipeline::{AnalysisError, FaceAnalyzer, FrameSource, FrameStore, SourceError, StoreError};
use crate::registry::{EnrollError, SharedRegistry};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("failed to capture image: {0}")]
    DeviceReadFailure(#[from] SourceError),
    #[error("failed to save capture: {0}")]
    Store(#[from] StoreError),
    #[error("face analysis failed: {0}")]
    Analysis(#[from] AnalysisError),
    #[error("enrollment rejected: {0}")]
    Enroll(EnrollError),
}

/// How a capture ended when the frame itself was captured and saved.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutcome {
    Enrolled {
        name: String,
        path: PathBuf,
        /// Registry size after enrollment.
        entries: usize,
    },
    /// Saved without a label.
    NoNameProvided { path: PathBuf },
    /// Saved, but no face was found to enroll.
    NoFaceDetected { path: PathBuf },
}

impl CaptureOutcome {
    pub fn path(&self) -> &std::path::Path {
        match self {
            CaptureOutcome::Enrolled { path, .. }
            | CaptureOutcome::NoNameProvided { path }
            | CaptureOutcome::NoFaceDetected { path } => path,
        }
    }
}

/// Pull one frame, save it, and enroll its most confident face under `name`.
///
/// A blank or missing name still saves the frame. Only a dimension clash
/// with existing enrollments surfaces as an [`CaptureError::Enroll`].
pub fn capture_and_enroll(
    source: &mut dyn FrameSource,
    store: &dyn FrameStore,
    analyzer: &mut FaceAnalyzer,
    registry: &SharedRegistry,
    name: Option<&str>,
) -> Result<CaptureOutcome, CaptureError> {
    let frame = source.read_frame()?;
    let path = store.save(&frame)?;
    tracing::info!(path = %path.display(), "image captured");

    let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) else {
        tracing::warn!(path = %path.display(), "no name entered, image saved without labeling");
        return Ok(CaptureOutcome::NoNameProvided { path });
    };

    let embedding = analyzer.embed_primary(&frame)?;
    let enrolled = registry.lock().enroll(name, embedding);

    match enrolled {
        Ok(entries) => Ok(CaptureOutcome::Enrolled {
            name: name.to_string(),
            path,
            entries,
        }),
        Err(EnrollError::NoFaceDetected) => {
            tracing::warn!(path = %path.display(), name, "no face detected in the image");
            Ok(CaptureOutcome::NoFaceDetected { path })
        }
        Err(e) => Err(CaptureError::Enroll(e)),
    }
}
