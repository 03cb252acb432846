use crate::config::Config;
use crate::preview::PreviewSink;
use crate::store::CaptureStore;
use facetag_core::{
    capture_and_enroll, Annotator, ArcFaceEmbedder, CaptureError, CaptureOutcome, DisplaySink,
    FaceAnalyzer, FrameSource, FrameStore, LoopControl, LoopExit, LoopMode, LoopState,
    RecognitionLoop, RunReport, ScrfdDetector, SharedRegistry,
};
use facetag_hw::Camera;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("camera error: {0}")]
    Camera(#[from] facetag_hw::CameraError),
    #[error("detector error: {0}")]
    Detector(#[from] facetag_core::detector::DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] facetag_core::recognizer::RecognizerError),
    #[error("capture store error: {0}")]
    Store(#[from] facetag_core::StoreError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Notifications from the engine thread.
#[derive(Debug)]
pub enum EngineEvent {
    /// A run ended. `generation` is the value [`EngineHandle::run`] returned.
    RunFinished { generation: u64, report: RunReport },
}

/// Messages sent from the control path to the engine thread.
enum EngineRequest {
    Capture {
        name: Option<String>,
        reply: oneshot::Sender<Result<CaptureOutcome, CaptureError>>,
    },
    Run {
        mode: LoopMode,
        generation: u64,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Everything the engine thread owns exclusively.
pub struct EngineParts {
    pub source: Box<dyn FrameSource>,
    pub analyzer: FaceAnalyzer,
    pub annotator: Annotator,
    pub sink: Box<dyn DisplaySink>,
    pub store: Box<dyn FrameStore>,
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    control: LoopControl,
    /// Bumped by every stop; a queued run from an older generation is skipped.
    generation: Arc<AtomicU64>,
}

impl EngineHandle {
    /// Stop any running loop, then capture one frame and enroll it under `name`.
    pub async fn capture(&self, name: Option<String>) -> Result<CaptureOutcome, EngineError> {
        self.stop();
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Capture {
                name,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        Ok(reply_rx.await.map_err(|_| EngineError::ChannelClosed)??)
    }

    /// Replace whatever loop is running with a new run in `mode`.
    ///
    /// Returns the run's generation, echoed in its [`EngineEvent::RunFinished`].
    pub async fn run(&self, mode: LoopMode) -> Result<u64, EngineError> {
        let generation = self.cancel();
        self.tx
            .send(EngineRequest::Run { mode, generation })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        Ok(generation)
    }

    /// Stop the current loop and cancel any queued run. Idempotent.
    pub fn stop(&self) {
        self.cancel();
    }

    fn cancel(&self) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.control.stop();
        generation
    }

    pub fn state(&self) -> LoopState {
        self.control.state()
    }

    /// Stop, release the frame source and wait for the engine thread to exit.
    pub async fn shutdown(self) -> Result<(), EngineError> {
        self.stop();
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Shutdown { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }
}

/// Open the camera and load both ONNX models, then spawn the engine.
///
/// Fails fast at startup if any resource is unavailable.
pub fn spawn_engine(
    config: &Config,
    registry: SharedRegistry,
) -> Result<(EngineHandle, mpsc::UnboundedReceiver<EngineEvent>), EngineError> {
    let camera = Camera::open(&config.camera_device)?;
    tracing::info!(
        device = %config.camera_device,
        width = camera.width,
        height = camera.height,
        fourcc = ?camera.fourcc,
        "camera opened"
    );
    camera.warm_up(config.warmup_frames);

    let detector = ScrfdDetector::load(&config.detector_model_path(), config.detection_threshold)?;
    let embedder = ArcFaceEmbedder::load(&config.recognizer_model_path())?;

    let annotator = match &config.label_font {
        Some(path) => Annotator::with_font_file(path).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "label font unavailable; drawing boxes only");
            Annotator::new()
        }),
        None => Annotator::new(),
    }
    .label_scale(config.label_size);

    let sink = PreviewSink::new(&config.preview_path);
    tracing::info!(path = %sink.path().display(), "preview sink ready");

    let parts = EngineParts {
        source: Box::new(camera),
        analyzer: FaceAnalyzer::new(Box::new(detector), Box::new(embedder)),
        annotator,
        sink: Box::new(sink),
        store: Box::new(CaptureStore::new(&config.output_dir)?),
    };
    spawn_with(parts, registry)
}

/// Spawn the engine on a dedicated OS thread that owns `parts`.
pub fn spawn_with(
    parts: EngineParts,
    registry: SharedRegistry,
) -> Result<(EngineHandle, mpsc::UnboundedReceiver<EngineEvent>), EngineError> {
    let (tx, rx) = mpsc::channel::<EngineRequest>(4);
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let control = LoopControl::new();
    let generation = Arc::new(AtomicU64::new(0));

    let worker = Worker {
        control: control.clone(),
        generation: generation.clone(),
        events: event_tx,
    };
    std::thread::Builder::new()
        .name("facetag-engine".into())
        .spawn(move || engine_main(parts, registry, worker, rx))
        .map_err(EngineError::Spawn)?;

    Ok((
        EngineHandle {
            tx,
            control,
            generation,
        },
        event_rx,
    ))
}

struct Worker {
    control: LoopControl,
    generation: Arc<AtomicU64>,
    events: mpsc::UnboundedSender<EngineEvent>,
}

impl Worker {
    /// Enter `Running` for a run queued at `generation`, unless a stop
    /// has happened since. The generation is checked after `start` so a
    /// stop racing with us is seen either here or by the loop itself.
    fn begin(&self, generation: u64) -> bool {
        if !self.control.start() {
            tracing::warn!("loop already running, ignoring run request");
            return false;
        }
        if self.generation.load(Ordering::SeqCst) != generation {
            self.control.stop();
            return false;
        }
        true
    }
}

fn engine_main(
    mut parts: EngineParts,
    registry: SharedRegistry,
    worker: Worker,
    mut rx: mpsc::Receiver<EngineRequest>,
) {
    tracing::info!("engine thread started");
    let mut shutdown_reply = None;

    while let Some(req) = rx.blocking_recv() {
        match req {
            EngineRequest::Capture { name, reply } => {
                let result = capture_and_enroll(
                    parts.source.as_mut(),
                    parts.store.as_ref(),
                    &mut parts.analyzer,
                    &registry,
                    name.as_deref(),
                );
                let _ = reply.send(result);
            }
            EngineRequest::Run { mode, generation } => {
                let report = if worker.begin(generation) {
                    RecognitionLoop {
                        source: parts.source.as_mut(),
                        analyzer: &mut parts.analyzer,
                        registry: &registry,
                        annotator: &parts.annotator,
                        sink: parts.sink.as_mut(),
                    }
                    .run(&worker.control, mode)
                } else {
                    tracing::debug!(?mode, "run cancelled before it started");
                    RunReport {
                        mode,
                        frames_shown: 0,
                        exit: LoopExit::Stopped,
                    }
                };
                let _ = worker
                    .events
                    .send(EngineEvent::RunFinished { generation, report });
            }
            EngineRequest::Shutdown { reply } => {
                shutdown_reply = Some(reply);
                break;
            }
        }
    }

    // Best effort: a failing release must not block exit.
    if let Err(e) = parts.source.release() {
        tracing::warn!(error = %e, "frame source release failed");
    }
    tracing::info!("engine thread exiting");
    drop(rx);
    if let Some(reply) = shutdown_reply {
        let _ = reply.send(());
    }
}
