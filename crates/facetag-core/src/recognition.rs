//! Recognition loop: pull, detect, embed, match, annotate, show.
//!
//! One loop serves both plain preview and annotated recognition, so the
//! frame source only ever has a single reader. The run state lives in a
//! [`LoopControl`] shared with the control path; the loop checks it once per
//! frame and never preempts a frame in progress.

use crate::annotate::Annotator;
use crate::pipeline::{AnalysisError, DisplaySink, FaceAnalyzer, FrameSource, SourceError};
use crate::registry::SharedRegistry;
use serde::Serialize;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopState {
    Idle,
    Running,
    Stopped,
}

impl LoopState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => LoopState::Running,
            2 => LoopState::Stopped,
            _ => LoopState::Idle,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            LoopState::Idle => 0,
            LoopState::Running => 1,
            LoopState::Stopped => 2,
        }
    }
}

/// Clone-safe handle on the loop state.
#[derive(Debug, Clone)]
pub struct LoopControl {
    state: Arc<AtomicU8>,
}

impl Default for LoopControl {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopControl {
    pub fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(LoopState::Idle.as_u8())),
        }
    }

    pub fn state(&self) -> LoopState {
        LoopState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_running(&self) -> bool {
        self.state() == LoopState::Running
    }

    /// `Idle | Stopped → Running`. Returns false if a run is already active.
    pub fn start(&self) -> bool {
        let running = LoopState::Running.as_u8();
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| {
                (s != running).then_some(running)
            })
            .is_ok()
    }

    /// Any state → `Stopped`. Idempotent.
    pub fn stop(&self) {
        let prev = self.state.swap(LoopState::Stopped.as_u8(), Ordering::AcqRel);
        if prev == LoopState::Running.as_u8() {
            tracing::debug!("stop requested for running loop");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopMode {
    /// Show raw frames.
    Preview,
    /// Detect, match and annotate every frame.
    Recognize,
}

#[derive(Debug)]
pub enum LoopExit {
    /// `stop()` was observed.
    Stopped,
    /// The frame source returned no frame.
    DeviceReadFailure(SourceError),
    /// Detection or embedding failed.
    AnalysisFailed(AnalysisError),
}

#[derive(Debug)]
pub struct RunReport {
    pub mode: LoopMode,
    pub frames_shown: usize,
    pub exit: LoopExit,
}

/// Borrowed collaborators for one loop run.
pub struct RecognitionLoop<'a> {
    pub source: &'a mut dyn FrameSource,
    pub analyzer: &'a mut FaceAnalyzer,
    pub registry: &'a SharedRegistry,
    pub annotator: &'a Annotator,
    pub sink: &'a mut dyn DisplaySink,
}

impl RecognitionLoop<'_> {
    /// Run until `control` leaves `Running` or a frame cannot be produced.
    ///
    /// The caller starts the control; a control that is not running when
    /// this is called yields an immediate `Stopped` report.
    pub fn run(&mut self, control: &LoopControl, mode: LoopMode) -> RunReport {
        tracing::info!(?mode, "loop started");
        let mut frames_shown = 0usize;

        let exit = loop {
            if !control.is_running() {
                break LoopExit::Stopped;
            }

            let frame = match self.source.read_frame() {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::error!(error = %e, frames_shown, "frame read failed, stopping loop");
                    break LoopExit::DeviceReadFailure(e);
                }
            };

            let shown = match mode {
                LoopMode::Preview => frame,
                LoopMode::Recognize => match self.recognize(&frame) {
                    Ok(annotated) => annotated,
                    Err(e) => {
                        tracing::error!(error = %e, frames_shown, "face analysis failed, stopping loop");
                        break LoopExit::AnalysisFailed(e);
                    }
                },
            };

            self.sink.show(&shown);
            frames_shown += 1;
        };

        control.stop();
        tracing::info!(?mode, frames_shown, "loop finished");
        RunReport {
            mode,
            frames_shown,
            exit,
        }
    }

    fn recognize(&mut self, frame: &image::RgbImage) -> Result<image::RgbImage, AnalysisError> {
        let faces = self.analyzer.analyze(frame)?;

        let labels: Vec<_> = {
            let registry = self.registry.lock();
            faces
                .into_iter()
                .map(|face| {
                    let name = registry.match_face(&face.embedding).to_string();
                    (face.bbox, name)
                })
                .collect()
        };

        if !labels.is_empty() {
            tracing::debug!(
                names = ?labels.iter().map(|(_, n)| n.as_str()).collect::<Vec<_>>(),
                "faces recognized"
            );
        }

        Ok(self.annotator.annotate(frame, &labels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::EuclideanMatcher;
    use crate::registry::Registry;
    use crate::testing::{face_at, RecordingSink, ScriptedAnalyzer, ScriptedSource};
    use crate::types::Embedding;
    use image::Rgb;

    fn empty_registry() -> SharedRegistry {
        Registry::new(Box::new(EuclideanMatcher::default())).shared()
    }

    fn run(
        source: &mut ScriptedSource,
        analyzer: &mut FaceAnalyzer,
        registry: &SharedRegistry,
        sink: &mut RecordingSink,
        control: &LoopControl,
        mode: LoopMode,
    ) -> RunReport {
        let annotator = Annotator::new();
        RecognitionLoop {
            source,
            analyzer,
            registry,
            annotator: &annotator,
            sink,
        }
        .run(control, mode)
    }

    #[test]
    fn test_stop_before_start_is_harmless() {
        let control = LoopControl::new();
        assert_eq!(control.state(), LoopState::Idle);
        control.stop();
        control.stop();
        assert_eq!(control.state(), LoopState::Stopped);
        assert!(control.start());
        assert_eq!(control.state(), LoopState::Running);
    }

    #[test]
    fn test_start_twice_rejected() {
        let control = LoopControl::new();
        assert!(control.start());
        assert!(!control.start());
        assert!(control.is_running());
    }

    #[test]
    fn test_idle_loop_pulls_no_frames() {
        let control = LoopControl::new();
        let mut source = ScriptedSource::endless();
        let mut analyzer = ScriptedAnalyzer::repeating(vec![]).into_analyzer();
        let mut sink = RecordingSink::default();

        let report = run(&mut source, &mut analyzer, &empty_registry(), &mut sink, &control, LoopMode::Preview);
        assert!(matches!(report.exit, LoopExit::Stopped));
        assert_eq!(report.frames_shown, 0);
        assert_eq!(source.reads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_read_failure_on_nth_pull() {
        for n in 1..=5 {
            let control = LoopControl::new();
            control.start();
            let mut source = ScriptedSource::failing_on(n);
            let mut analyzer = ScriptedAnalyzer::repeating(vec![]).into_analyzer();
            let mut sink = RecordingSink::default();

            let report = run(&mut source, &mut analyzer, &empty_registry(), &mut sink, &control, LoopMode::Recognize);
            assert!(matches!(report.exit, LoopExit::DeviceReadFailure(_)), "n={n}");
            assert_eq!(report.frames_shown, n - 1);
            assert_eq!(sink.count(), n - 1);
            assert_eq!(control.state(), LoopState::Stopped);
        }
    }

    #[test]
    fn test_stop_observed_at_next_iteration() {
        let control = LoopControl::new();
        control.start();
        let mut source = ScriptedSource::endless();
        let mut analyzer = ScriptedAnalyzer::repeating(vec![]).into_analyzer();
        let mut sink = RecordingSink::stopping_after(3, control.clone());

        let report = run(&mut source, &mut analyzer, &empty_registry(), &mut sink, &control, LoopMode::Preview);
        assert!(matches!(report.exit, LoopExit::Stopped));
        assert_eq!(report.frames_shown, 3);
        assert_eq!(source.reads.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_preview_skips_analysis() {
        let control = LoopControl::new();
        control.start();
        let mut source = ScriptedSource::failing_on(4);
        let scripted = ScriptedAnalyzer::repeating(vec![(face_at(0.0, 0.0), vec![1.0])]);
        let calls = scripted.detect_calls.clone();
        let mut analyzer = scripted.into_analyzer();
        let mut sink = RecordingSink::default();

        let report = run(&mut source, &mut analyzer, &empty_registry(), &mut sink, &control, LoopMode::Preview);
        assert_eq!(report.frames_shown, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        // Raw frames are shown unmodified.
        assert_eq!(*sink.shown.lock()[0].get_pixel(0, 0), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_recognize_annotates_faces() {
        let registry = empty_registry();
        registry
            .lock()
            .enroll("Alice", Some(Embedding::new(vec![1.0, 0.0])))
            .unwrap();

        let control = LoopControl::new();
        control.start();
        let mut source = ScriptedSource::failing_on(2);
        let mut analyzer = ScriptedAnalyzer::repeating(vec![(face_at(10.0, 10.0), vec![1.0, 0.0])]).into_analyzer();
        let mut sink = RecordingSink::default();

        let report = run(&mut source, &mut analyzer, &registry, &mut sink, &control, LoopMode::Recognize);
        assert_eq!(report.frames_shown, 1);
        let shown = sink.shown.lock();
        assert_eq!(*shown[0].get_pixel(10, 10), Rgb([0, 255, 0]));
    }

    #[test]
    fn test_analysis_failure_halts_run() {
        let control = LoopControl::new();
        control.start();
        let mut source = ScriptedSource::endless();
        let mut analyzer = ScriptedAnalyzer::repeating(vec![])
            .failing_after(2)
            .into_analyzer();
        let mut sink = RecordingSink::default();

        let report = run(&mut source, &mut analyzer, &empty_registry(), &mut sink, &control, LoopMode::Recognize);
        assert!(matches!(report.exit, LoopExit::AnalysisFailed(_)));
        assert_eq!(report.frames_shown, 2);
        assert_eq!(control.state(), LoopState::Stopped);
    }
}
