//! SCRFD face detector via ONNX Runtime.
//!
//! Letterboxes the RGB frame into a 640×640 input, decodes the three
//! anchor-free stride heads and applies NMS.

use crate::pipeline::{AnalysisError, FaceDetector};
use crate::types::BoundingBox;
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const SCRFD_INPUT_SIZE: u32 = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
pub const SCRFD_DEFAULT_CONFIDENCE: f32 = 0.5;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}; download from insightface and place in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Maps letterboxed input coordinates back to frame coordinates.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl Letterbox {
    fn fit(width: u32, height: u32, target: u32) -> Self {
        let scale = (target as f32 / width as f32).min(target as f32 / height as f32);
        let new_w = (width as f32 * scale).round();
        let new_h = (height as f32 * scale).round();
        Self {
            scale,
            pad_x: ((target as f32 - new_w) / 2.0).floor(),
            pad_y: ((target as f32 - new_h) / 2.0).floor(),
        }
    }

    fn resized_size(&self, width: u32, height: u32) -> (u32, u32) {
        (
            ((width as f32 * self.scale).round() as u32).max(1),
            ((height as f32 * self.scale).round() as u32).max(1),
        )
    }

    fn to_frame(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Output tensor indices for one stride: (score, bbox, kps).
type StrideOutputs = (usize, usize, usize);

/// SCRFD-based face detector.
pub struct ScrfdDetector {
    session: Session,
    stride_outputs: [StrideOutputs; 3],
    confidence_threshold: f32,
}

impl ScrfdDetector {
    /// Load the SCRFD ONNX model from the given path.
    pub fn load(model_path: &str, confidence_threshold: f32) -> Result<Self, DetectorError> {
        if !Path::new(model_path).exists() {
            return Err(DetectorError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)
            .map_err(ort::Error::from)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> = session
            .outputs()
            .iter()
            .map(|o| o.name().to_string())
            .collect();

        tracing::info!(path = model_path, outputs = ?output_names, "loaded SCRFD model");

        if output_names.len() < 9 {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD model requires 9 outputs (3 strides × score/bbox/kps), got {}",
                output_names.len()
            )));
        }

        let stride_outputs = map_outputs(&output_names);
        tracing::debug!(?stride_outputs, "SCRFD output tensor mapping");

        Ok(Self {
            session,
            stride_outputs,
            confidence_threshold,
        })
    }

    /// Detect faces, returning boxes sorted by descending confidence.
    pub fn detect_faces(&mut self, frame: &RgbImage) -> Result<Vec<BoundingBox>, DetectorError> {
        if frame.width() == 0 || frame.height() == 0 {
            return Ok(Vec::new());
        }
        let letterbox = Letterbox::fit(frame.width(), frame.height(), SCRFD_INPUT_SIZE);
        let input = preprocess(frame, &letterbox);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (&stride, &(score_idx, bbox_idx, kps_idx)) in
            SCRFD_STRIDES.iter().zip(self.stride_outputs.iter())
        {
            let extract = |idx: usize, what: &str| {
                outputs[idx]
                    .try_extract_tensor::<f32>()
                    .map(|(_, data)| data)
                    .map_err(|e| DetectorError::InferenceFailed(format!("{what} stride {stride}: {e}")))
            };
            let heads = StrideHeads {
                stride,
                scores: extract(score_idx, "scores")?,
                bboxes: extract(bbox_idx, "bboxes")?,
                kps: extract(kps_idx, "kps")?,
            };
            candidates.extend(heads.decode(&letterbox, self.confidence_threshold));
        }

        let faces = nms(candidates, SCRFD_NMS_THRESHOLD);
        tracing::trace!(faces = faces.len(), "SCRFD detections");
        Ok(faces)
    }
}

impl FaceDetector for ScrfdDetector {
    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<BoundingBox>, AnalysisError> {
        Ok(self.detect_faces(frame)?)
    }
}

/// Letterbox-resize into a normalized NCHW RGB tensor. Padding is the mean,
/// which normalizes to 0.0.
fn preprocess(frame: &RgbImage, letterbox: &Letterbox) -> Array4<f32> {
    let (new_w, new_h) = letterbox.resized_size(frame.width(), frame.height());
    let resized = imageops::resize(frame, new_w, new_h, FilterType::Triangle);

    let size = SCRFD_INPUT_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    let (pad_x, pad_y) = (letterbox.pad_x as u32, letterbox.pad_y as u32);

    for (x, y, pixel) in resized.enumerate_pixels() {
        let (tx, ty) = ((x + pad_x) as usize, (y + pad_y) as usize);
        if tx >= size || ty >= size {
            continue;
        }
        for c in 0..3 {
            tensor[[0, c, ty, tx]] = (pixel[c] as f32 - SCRFD_MEAN) / SCRFD_STD;
        }
    }
    tensor
}

/// Find per-stride tensors by name ("score_8", "bbox_16", "kps_32", ...).
///
/// Exports with generic numeric names fall back to the standard order:
/// [0-2] scores, [3-5] bboxes, [6-8] kps, each for strides 8/16/32.
fn map_outputs(names: &[String]) -> [StrideOutputs; 3] {
    let position = |prefix: &str, stride: usize| {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| *n == target)
    };

    let mut mapped = [(0, 0, 0); 3];
    for (slot, &stride) in SCRFD_STRIDES.iter().enumerate() {
        match (
            position("score", stride),
            position("bbox", stride),
            position("kps", stride),
        ) {
            (Some(s), Some(b), Some(k)) => mapped[slot] = (s, b, k),
            _ => {
                tracing::info!(?names, "SCRFD output names not recognized, using positional mapping");
                return [(0, 3, 6), (1, 4, 7), (2, 5, 8)];
            }
        }
    }
    mapped
}

/// Raw head outputs for one stride level.
struct StrideHeads<'a> {
    stride: usize,
    scores: &'a [f32],
    bboxes: &'a [f32],
    kps: &'a [f32],
}

impl StrideHeads<'_> {
    fn decode(&self, letterbox: &Letterbox, threshold: f32) -> Vec<BoundingBox> {
        let grid = SCRFD_INPUT_SIZE as usize / self.stride;
        let anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;
        let step = self.stride as f32;

        (0..anchors.min(self.scores.len()))
            .filter(|&i| self.scores[i] > threshold)
            .filter_map(|i| {
                let cell = i / SCRFD_ANCHORS_PER_CELL;
                let cx = (cell % grid) as f32 * step;
                let cy = (cell / grid) as f32 * step;

                let d = self.bboxes.get(i * 4..i * 4 + 4)?;
                let (left, top) = letterbox.to_frame(cx - d[0] * step, cy - d[1] * step);
                let (right, bottom) = letterbox.to_frame(cx + d[2] * step, cy + d[3] * step);

                let landmarks = self.kps.get(i * 10..i * 10 + 10).map(|k| {
                    std::array::from_fn(|p| {
                        letterbox.to_frame(cx + k[p * 2] * step, cy + k[p * 2 + 1] * step)
                    })
                });

                Some(BoundingBox {
                    top,
                    right,
                    bottom,
                    left,
                    confidence: self.scores[i],
                    landmarks,
                })
            })
            .collect()
    }
}

/// Greedy non-maximum suppression; output is sorted by descending confidence.
fn nms(mut candidates: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<BoundingBox> = Vec::new();
    for candidate in candidates {
        if kept.iter().all(|k| k.iou(&candidate) <= iou_threshold) {
            kept.push(candidate);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_box(left: f32, top: f32, w: f32, h: f32, conf: f32) -> BoundingBox {
        BoundingBox {
            top,
            right: left + w,
            bottom: top + h,
            left,
            confidence: conf,
            landmarks: None,
        }
    }

    #[test]
    fn test_nms_suppresses_overlapping() {
        let result = nms(
            vec![
                make_box(5.0, 5.0, 100.0, 100.0, 0.8),
                make_box(0.0, 0.0, 100.0, 100.0, 0.9),
                make_box(200.0, 200.0, 50.0, 50.0, 0.7),
            ],
            0.4,
        );
        assert_eq!(result.len(), 2);
        assert!((result[0].confidence - 0.9).abs() < 1e-6);
        assert!((result[1].confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_nms_empty() {
        assert!(nms(vec![], 0.4).is_empty());
    }

    #[test]
    fn test_letterbox_landscape() {
        let lb = Letterbox::fit(640, 480, 640);
        assert!((lb.scale - 1.0).abs() < 1e-6);
        assert_eq!(lb.pad_x, 0.0);
        assert_eq!(lb.pad_y, 80.0);
        assert_eq!(lb.resized_size(640, 480), (640, 480));
    }

    #[test]
    fn test_letterbox_maps_back_to_frame() {
        let lb = Letterbox::fit(320, 240, 640);
        let (x, y) = (100.0f32, 50.0f32);
        let boxed = (x * lb.scale + lb.pad_x, y * lb.scale + lb.pad_y);
        let (rx, ry) = lb.to_frame(boxed.0, boxed.1);
        assert!((rx - x).abs() < 0.1, "x: {rx} vs {x}");
        assert!((ry - y).abs() < 0.1, "y: {ry} vs {y}");
    }

    #[test]
    fn test_preprocess_pads_with_zero() {
        let frame = RgbImage::from_pixel(640, 480, image::Rgb([255, 0, 128]));
        let lb = Letterbox::fit(640, 480, 640);
        let t = preprocess(&frame, &lb);
        assert_eq!(t.shape(), &[1, 3, 640, 640]);
        // Top padding band.
        assert_eq!(t[[0, 0, 10, 10]], 0.0);
        // Image area, channel order preserved.
        assert!((t[[0, 0, 300, 300]] - (255.0 - 127.5) / 128.0).abs() < 1e-5);
        assert!((t[[0, 1, 300, 300]] - (0.0 - 127.5) / 128.0).abs() < 1e-5);
    }

    #[test]
    fn test_map_outputs_named_shuffled() {
        let names: Vec<String> = [
            "bbox_8", "kps_8", "score_8", "bbox_16", "kps_16", "score_16", "bbox_32", "kps_32",
            "score_32",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        assert_eq!(map_outputs(&names), [(2, 0, 1), (5, 3, 4), (8, 6, 7)]);
    }

    #[test]
    fn test_map_outputs_positional_fallback() {
        let names: Vec<String> = (0..9).map(|i: usize| (448 + i).to_string()).collect();
        assert_eq!(map_outputs(&names), [(0, 3, 6), (1, 4, 7), (2, 5, 8)]);
    }

    #[test]
    fn test_decode_single_anchor() {
        let grid = 640 / 32;
        let anchors = grid * grid * 2;
        let mut scores = vec![0.0f32; anchors];
        let mut bboxes = vec![0.0f32; anchors * 4];
        let kps = vec![0.0f32; anchors * 10];

        // Anchor index 2 → cell 1 → centre (32, 0) in input space.
        scores[2] = 0.9;
        bboxes[8..12].copy_from_slice(&[0.5, 0.0, 0.5, 1.0]);

        let heads = StrideHeads {
            stride: 32,
            scores: &scores,
            bboxes: &bboxes,
            kps: &kps,
        };
        let lb = Letterbox {
            scale: 1.0,
            pad_x: 0.0,
            pad_y: 0.0,
        };
        let faces = heads.decode(&lb, 0.5);
        assert_eq!(faces.len(), 1);
        let f = &faces[0];
        assert_eq!((f.left, f.top, f.right, f.bottom), (16.0, 0.0, 48.0, 32.0));
        assert_eq!(f.landmarks.map(|l| l[0]), Some((32.0, 0.0)));
    }
}
