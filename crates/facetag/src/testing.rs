//! Engine doubles shared by the engine and console tests.

use crate::engine::{spawn_with, EngineEvent, EngineHandle, EngineParts};
use facetag_core::{
    AnalysisError, Annotator, BoundingBox, DisplaySink, Embedding, EuclideanMatcher, FaceAnalyzer,
    FaceDetector, FaceEmbedder, FrameSource, FrameStore, Registry, SharedRegistry, SourceError,
    StoreError,
};
use image::RgbImage;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Embedding reported for every face [`OneFace`] finds.
pub const FACE_EMBEDDING: [f32; 2] = [0.25, 0.75];

/// Succeeds `frames` times, then fails; counts releases.
struct CountingSource {
    frames: Option<usize>,
    releases: Arc<AtomicUsize>,
}

impl FrameSource for CountingSource {
    fn read_frame(&mut self) -> Result<RgbImage, SourceError> {
        match self.frames.as_mut() {
            Some(0) => Err(SourceError::ReadFailed("unplugged".into())),
            Some(n) => {
                *n -= 1;
                Ok(RgbImage::new(32, 32))
            }
            None => {
                std::thread::sleep(std::time::Duration::from_millis(1));
                Ok(RgbImage::new(32, 32))
            }
        }
    }

    fn release(&mut self) -> Result<(), SourceError> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// One face at the same place with the same embedding on every frame.
struct OneFace;

impl FaceDetector for OneFace {
    fn detect(&mut self, _frame: &RgbImage) -> Result<Vec<BoundingBox>, AnalysisError> {
        Ok(vec![BoundingBox {
            top: 2.0,
            right: 22.0,
            bottom: 22.0,
            left: 2.0,
            confidence: 0.99,
            landmarks: None,
        }])
    }
}

impl FaceEmbedder for OneFace {
    fn embed(&mut self, _frame: &RgbImage, faces: &[BoundingBox]) -> Result<Vec<Embedding>, AnalysisError> {
        Ok(faces.iter().map(|_| Embedding::new(FACE_EMBEDDING.to_vec())).collect())
    }
}

#[derive(Default, Clone)]
struct CountingSink(Arc<AtomicUsize>);

impl DisplaySink for CountingSink {
    fn show(&mut self, _frame: &RgbImage) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default, Clone)]
struct VecStore(Arc<Mutex<usize>>);

impl FrameStore for VecStore {
    fn save(&self, _frame: &RgbImage) -> Result<PathBuf, StoreError> {
        let mut n = self.0.lock();
        *n += 1;
        Ok(PathBuf::from(format!("pictures/captured_{n}.jpg")))
    }
}

pub struct Fixture {
    pub handle: EngineHandle,
    pub events: mpsc::UnboundedReceiver<EngineEvent>,
    pub registry: SharedRegistry,
    pub releases: Arc<AtomicUsize>,
    pub shown: Arc<AtomicUsize>,
}

/// Engine over doubles. `frames: None` yields frames forever.
pub fn engine_fixture(frames: Option<usize>) -> Fixture {
    let releases = Arc::new(AtomicUsize::new(0));
    let sink = CountingSink::default();
    let shown = sink.0.clone();
    let registry = Registry::new(Box::new(EuclideanMatcher::default())).shared();
    let parts = EngineParts {
        source: Box::new(CountingSource {
            frames,
            releases: releases.clone(),
        }),
        analyzer: FaceAnalyzer::new(Box::new(OneFace), Box::new(OneFace)),
        annotator: Annotator::new(),
        sink: Box::new(sink),
        store: Box::new(VecStore::default()),
    };
    let (handle, events) = spawn_with(parts, registry.clone()).unwrap();
    Fixture {
        handle,
        events,
        registry,
        releases,
        shown,
    }
}
