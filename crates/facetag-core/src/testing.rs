//! Test doubles for the pipeline traits.

use crate::pipeline::{
    AnalysisError, DisplaySink, FaceAnalyzer, FaceDetector, FaceEmbedder, FrameSource,
    FrameStore, SourceError, StoreError,
};
use crate::recognition::LoopControl;
use crate::types::{BoundingBox, Embedding};
use image::{Rgb, RgbImage};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A 20x20 face box with its top-left corner at (left, top).
pub fn face_at(left: f32, top: f32) -> BoundingBox {
    BoundingBox {
        top,
        right: left + 20.0,
        bottom: top + 20.0,
        left,
        confidence: 0.9,
        landmarks: None,
    }
}

/// Yields `frames` numbered frames, then fails every read.
pub struct ScriptedSource {
    remaining: Option<usize>,
    pub reads: Arc<AtomicUsize>,
    pub releases: Arc<AtomicUsize>,
    released: bool,
}

impl ScriptedSource {
    /// Fails on read number `n` (1-based); the first `n - 1` reads succeed.
    pub fn failing_on(n: usize) -> Self {
        Self {
            remaining: Some(n.saturating_sub(1)),
            reads: Arc::default(),
            releases: Arc::default(),
            released: false,
        }
    }

    pub fn endless() -> Self {
        Self {
            remaining: None,
            reads: Arc::default(),
            releases: Arc::default(),
            released: false,
        }
    }
}

impl FrameSource for ScriptedSource {
    fn read_frame(&mut self) -> Result<RgbImage, SourceError> {
        if self.released {
            return Err(SourceError::Released);
        }
        let seq = self.reads.fetch_add(1, Ordering::SeqCst);
        match self.remaining.as_mut() {
            Some(0) => return Err(SourceError::ReadFailed("no frame".into())),
            Some(n) => *n -= 1,
            None => {}
        }
        Ok(RgbImage::from_pixel(64, 64, Rgb([seq as u8, 0, 0])))
    }

    fn release(&mut self) -> Result<(), SourceError> {
        if !self.released {
            self.released = true;
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Records every frame it is shown; can stop a loop after `n` frames.
#[derive(Default)]
pub struct RecordingSink {
    pub shown: Arc<Mutex<Vec<RgbImage>>>,
    stop_after: Option<(usize, LoopControl)>,
}

impl RecordingSink {
    pub fn stopping_after(n: usize, control: LoopControl) -> Self {
        Self {
            shown: Arc::default(),
            stop_after: Some((n, control)),
        }
    }

    pub fn count(&self) -> usize {
        self.shown.lock().len()
    }
}

impl DisplaySink for RecordingSink {
    fn show(&mut self, frame: &RgbImage) {
        let mut shown = self.shown.lock();
        shown.push(frame.clone());
        if let Some((n, control)) = &self.stop_after {
            if shown.len() >= *n {
                control.stop();
            }
        }
    }
}

struct Script {
    faces: Vec<(BoundingBox, Embedding)>,
    fail_after: Option<usize>,
}

/// Detector/embedder pair that reports the same faces on every frame.
#[derive(Clone)]
pub struct ScriptedAnalyzer {
    script: Arc<Mutex<Script>>,
    pub detect_calls: Arc<AtomicUsize>,
}

impl ScriptedAnalyzer {
    pub fn repeating(faces: Vec<(BoundingBox, Vec<f32>)>) -> Self {
        let faces = faces
            .into_iter()
            .map(|(b, v)| (b, Embedding::new(v)))
            .collect();
        Self {
            script: Arc::new(Mutex::new(Script {
                faces,
                fail_after: None,
            })),
            detect_calls: Arc::default(),
        }
    }

    /// Detection fails once `n` detect calls have succeeded.
    pub fn failing_after(self, n: usize) -> Self {
        self.script.lock().fail_after = Some(n);
        self
    }

    pub fn into_analyzer(self) -> FaceAnalyzer {
        FaceAnalyzer::new(Box::new(self.clone()), Box::new(ScriptedEmbedder(self)))
    }
}

impl FaceDetector for ScriptedAnalyzer {
    fn detect(&mut self, _frame: &RgbImage) -> Result<Vec<BoundingBox>, AnalysisError> {
        let calls = self.detect_calls.fetch_add(1, Ordering::SeqCst);
        let script = self.script.lock();
        if script.fail_after.is_some_and(|n| calls >= n) {
            return Err(AnalysisError::Other("scripted detector failure".into()));
        }
        Ok(script.faces.iter().map(|(b, _)| b.clone()).collect())
    }
}

struct ScriptedEmbedder(ScriptedAnalyzer);

impl FaceEmbedder for ScriptedEmbedder {
    fn embed(
        &mut self,
        _frame: &RgbImage,
        faces: &[BoundingBox],
    ) -> Result<Vec<Embedding>, AnalysisError> {
        let script = self.0.script.lock();
        Ok(faces
            .iter()
            .filter_map(|face| {
                script
                    .faces
                    .iter()
                    .find(|(b, _)| b == face)
                    .map(|(_, e)| e.clone())
            })
            .collect())
    }
}

/// Frame store that keeps frames in memory.
#[derive(Default)]
pub struct MemoryStore {
    pub saved: Arc<Mutex<Vec<RgbImage>>>,
}

impl FrameStore for MemoryStore {
    fn save(&self, frame: &RgbImage) -> Result<PathBuf, StoreError> {
        let mut saved = self.saved.lock();
        saved.push(frame.clone());
        Ok(PathBuf::from(format!("memory/captured_{}.jpg", saved.len())))
    }
}
