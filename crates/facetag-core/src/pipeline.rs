//! Seams between the recognition logic and its collaborators.
//!
//! The camera, the face models, the display and the capture store all sit
//! behind these traits so the loop and the enrollment flow can run against
//! real hardware or test doubles alike.

use crate::detector::DetectorError;
use crate::recognizer::RecognizerError;
use crate::types::{BoundingBox, DetectedFace, Embedding};
use image::RgbImage;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("device read failure: {0}")]
    ReadFailed(String),
    #[error("frame source already released")]
    Released,
}

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("face analysis failed: {0}")]
    Other(String),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("image encode: {0}")]
    Image(#[from] image::ImageError),
}

/// A camera-like device yielding one RGB frame per read.
pub trait FrameSource: Send {
    fn read_frame(&mut self) -> Result<RgbImage, SourceError>;

    /// Release the device. Reads after release fail with [`SourceError::Released`].
    fn release(&mut self) -> Result<(), SourceError>;
}

/// Finds faces in a frame, most confident first.
pub trait FaceDetector: Send {
    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<BoundingBox>, AnalysisError>;
}

/// Produces one embedding per face, aligned by index with `faces`.
pub trait FaceEmbedder: Send {
    fn embed(
        &mut self,
        frame: &RgbImage,
        faces: &[BoundingBox],
    ) -> Result<Vec<Embedding>, AnalysisError>;
}

/// Renders or forwards a frame for display.
pub trait DisplaySink: Send {
    fn show(&mut self, frame: &RgbImage);
}

/// Persists a captured frame, returning where it was written.
pub trait FrameStore: Send {
    fn save(&self, frame: &RgbImage) -> Result<PathBuf, StoreError>;
}

/// A detector/embedder pair run back to back on each frame.
pub struct FaceAnalyzer {
    detector: Box<dyn FaceDetector>,
    embedder: Box<dyn FaceEmbedder>,
}

impl FaceAnalyzer {
    pub fn new(detector: Box<dyn FaceDetector>, embedder: Box<dyn FaceEmbedder>) -> Self {
        Self { detector, embedder }
    }

    /// Detect and embed every face in the frame.
    ///
    /// Detections and embeddings are paired by position; surplus items on
    /// either side are dropped.
    pub fn analyze(&mut self, frame: &RgbImage) -> Result<Vec<DetectedFace>, AnalysisError> {
        let boxes = self.detector.detect(frame)?;
        if boxes.is_empty() {
            return Ok(Vec::new());
        }
        let embeddings = self.embedder.embed(frame, &boxes)?;
        if embeddings.len() != boxes.len() {
            tracing::warn!(
                faces = boxes.len(),
                embeddings = embeddings.len(),
                "embedder returned a different count than detector"
            );
        }
        Ok(boxes
            .into_iter()
            .zip(embeddings)
            .map(|(bbox, embedding)| DetectedFace { bbox, embedding })
            .collect())
    }

    /// Embedding of the most confident face, or `None` when no face is found.
    pub fn embed_primary(&mut self, frame: &RgbImage) -> Result<Option<Embedding>, AnalysisError> {
        let boxes = self.detector.detect(frame)?;
        let Some(primary) = boxes.into_iter().next() else {
            return Ok(None);
        };
        let mut embeddings = self.embedder.embed(frame, std::slice::from_ref(&primary))?;
        Ok(if embeddings.is_empty() {
            None
        } else {
            Some(embeddings.swap_remove(0))
        })
    }
}
