//! facetag-core: named face registry and live recognition.
//!
//! Holds enrolled (name, embedding) pairs, matches detected faces against
//! them, and drives the per-frame recognition loop. Face detection (SCRFD)
//! and embedding (ArcFace) run via ONNX Runtime behind the pipeline traits.

pub mod alignment;
pub mod annotate;
pub mod detector;
pub mod enrollment;
pub mod matcher;
pub mod pipeline;
pub mod recognition;
pub mod recognizer;
pub mod registry;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use annotate::Annotator;
pub use detector::ScrfdDetector;
pub use enrollment::{capture_and_enroll, CaptureError, CaptureOutcome};
pub use matcher::{CosineMatcher, EuclideanMatcher, FaceMatcher, MatchPolicy};
pub use pipeline::{
    AnalysisError, DisplaySink, FaceAnalyzer, FaceDetector, FaceEmbedder, FrameSource, FrameStore,
    SourceError, StoreError,
};
pub use recognition::{LoopControl, LoopExit, LoopMode, LoopState, RecognitionLoop, RunReport};
pub use recognizer::ArcFaceEmbedder;
pub use registry::{EnrollError, Registry, RegistryEntry, SharedRegistry, UNKNOWN};
pub use types::{BoundingBox, DetectedFace, Embedding};

use std::path::PathBuf;

/// SCRFD detection model file name.
pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
/// ArcFace recognition model file name.
pub const RECOGNIZER_MODEL_FILE: &str = "w600k_r50.onnx";

/// `$XDG_DATA_HOME/facetag/models`, falling back to `~/.local/share`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facetag")
        .join("models")
}
