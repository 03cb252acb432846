//! Draws face rectangles and name labels onto frames.

use crate::types::BoundingBox;
use ab_glyph::{Font, FontArc, PxScale, ScaleFont};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use std::path::Path;
use thiserror::Error;

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const LABEL_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const BOX_THICKNESS: i32 = 2;
/// Label inset from the box's bottom-left corner, in pixels.
const LABEL_INSET: i32 = 6;
/// Default label glyph height in pixels.
pub const DEFAULT_LABEL_SCALE: f32 = 18.0;

#[derive(Error, Debug)]
pub enum AnnotateError {
    #[error("failed to read font {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("not a usable TrueType/OpenType font: {0}")]
    InvalidFont(String),
}

/// Renders recognition results. Without a font only rectangles are drawn.
#[derive(Clone)]
pub struct Annotator {
    font: Option<FontArc>,
    scale: PxScale,
}

impl Default for Annotator {
    fn default() -> Self {
        Self {
            font: None,
            scale: PxScale::from(DEFAULT_LABEL_SCALE),
        }
    }
}

impl Annotator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_font(font: FontArc) -> Self {
        Self {
            font: Some(font),
            ..Self::default()
        }
    }

    /// Label glyph height in pixels.
    pub fn label_scale(mut self, px: f32) -> Self {
        self.scale = PxScale::from(px);
        self
    }

    /// Load a label font from a `.ttf`/`.otf` file.
    pub fn with_font_file(path: &Path) -> Result<Self, AnnotateError> {
        let bytes = std::fs::read(path).map_err(|source| AnnotateError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let font = FontArc::try_from_vec(bytes)
            .map_err(|_| AnnotateError::InvalidFont(path.display().to_string()))?;
        tracing::info!(path = %path.display(), "loaded label font");
        Ok(Self::with_font(font))
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Copy of `frame` with every face boxed and labelled.
    pub fn annotate(&self, frame: &RgbImage, faces: &[(BoundingBox, String)]) -> RgbImage {
        let mut out = frame.clone();
        for (bbox, name) in faces {
            self.draw_face(&mut out, bbox, name);
        }
        out
    }

    fn draw_face(&self, img: &mut RgbImage, bbox: &BoundingBox, name: &str) {
        let Some((x, y, w, h)) = bbox.clip_to(img.width(), img.height()) else {
            tracing::trace!(?bbox, "face box outside frame, not drawn");
            return;
        };

        for inset in 0..BOX_THICKNESS {
            let (iw, ih) = (w as i32 - 2 * inset, h as i32 - 2 * inset);
            if iw <= 0 || ih <= 0 {
                break;
            }
            let rect = Rect::at(x + inset, y + inset).of_size(iw as u32, ih as u32);
            draw_hollow_rect_mut(img, rect, BOX_COLOR);
        }

        if let Some(font) = &self.font {
            let ascent = font.as_scaled(self.scale).ascent();
            let (text_x, text_y) = label_origin(x, y + h as i32, ascent);
            draw_text_mut(img, LABEL_COLOR, text_x, text_y, self.scale, font, name);
        }
    }
}

/// Top-left origin for `draw_text_mut` that puts the baseline LABEL_INSET
/// above `bottom`. Text is laid out with its baseline `ascent` below the origin.
fn label_origin(left: i32, bottom: i32, ascent: f32) -> (i32, i32) {
    (left + LABEL_INSET, bottom - LABEL_INSET - ascent.round() as i32)
}
