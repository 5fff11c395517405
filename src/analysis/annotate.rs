//! Overlay rendering for reviewed detections.
//!
//! This is a rendering policy, not a storage one: every detection is
//! persisted, but only those above the confidence threshold are drawn.

use ab_glyph::{FontVec, PxScale};
use image::{DynamicImage, Rgba, RgbaImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::detect::Detection;

/// Detections at or below this score are kept in storage but suppressed
/// from the overlay. Strictly greater-than: exactly 0.30 is not drawn.
pub const CONFIDENCE_THRESHOLD: f32 = 0.3;

const BOX_COLOR: Rgba<u8> = Rgba([255, 0, 0, 255]);
const LABEL_COLOR: Rgba<u8> = Rgba([0, 0, 255, 255]);
const CONFIDENCE_COLOR: Rgba<u8> = Rgba([0, 255, 0, 255]);

/// One detection that made it onto the overlay.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedDetection {
    /// 1-based position in the full detection list, drawn next to the label.
    pub index: usize,
    pub label: String,
    /// Integer percentage, truncated as the original overlay did.
    pub confidence_pct: u32,
}

pub struct AnnotatedImage {
    pub image: RgbaImage,
    pub rendered: Vec<RenderedDetection>,
}

/// Draws bounding boxes and labels for above-threshold detections.
pub struct Annotator {
    font: Option<FontVec>,
}

impl Annotator {
    /// Boxes only; label and percentage text need a font, see
    /// [`Annotator::with_font`].
    pub fn new() -> Self {
        Self { font: None }
    }

    pub fn with_font(font: FontVec) -> Self {
        Self { font: Some(font) }
    }

    pub fn annotate(&self, image: &DynamicImage, detections: &[Detection]) -> AnnotatedImage {
        let mut canvas = image.to_rgba8();
        let width = canvas.width();
        // Stroke and text sizes scale with the image, same ratios as the
        // original overlay.
        let stroke = (width / 95).max(1);
        let label_scale = PxScale::from((width as f32 / 10.0).max(8.0));
        let confidence_scale = PxScale::from((width as f32 / 20.0).max(8.0));

        let mut rendered = Vec::new();
        for (i, detection) in detections.iter().enumerate() {
            if detection.confidence <= CONFIDENCE_THRESHOLD {
                continue;
            }

            draw_thick_hollow_rect(&mut canvas, detection, stroke);

            let entry = RenderedDetection {
                index: i + 1,
                label: detection.label.clone(),
                confidence_pct: (detection.confidence * 100.0) as u32,
            };

            if let Some(font) = &self.font {
                let left = detection.bounding_box.left.round() as i32;
                let top = detection.bounding_box.top.round() as i32;
                let bottom = detection.bounding_box.bottom.round() as i32;
                draw_text_mut(
                    &mut canvas,
                    LABEL_COLOR,
                    left,
                    top,
                    label_scale,
                    font,
                    &format!("{} {}", entry.index, entry.label),
                );
                draw_text_mut(
                    &mut canvas,
                    CONFIDENCE_COLOR,
                    left,
                    bottom,
                    confidence_scale,
                    font,
                    &entry.confidence_pct.to_string(),
                );
            }

            rendered.push(entry);
        }

        AnnotatedImage {
            image: canvas,
            rendered,
        }
    }
}

impl Default for Annotator {
    fn default() -> Self {
        Self::new()
    }
}

fn draw_thick_hollow_rect(canvas: &mut RgbaImage, detection: &Detection, stroke: u32) {
    let (w, h) = (canvas.width() as i32, canvas.height() as i32);
    let bb = &detection.bounding_box;

    let x1 = bb.left.round() as i32;
    let y1 = bb.top.round() as i32;
    let x2 = bb.right.round() as i32;
    let y2 = bb.bottom.round() as i32;
    let x_min = x1.min(x2).clamp(0, w);
    let y_min = y1.min(y2).clamp(0, h);
    let x_max = x1.max(x2).clamp(0, w);
    let y_max = y1.max(y2).clamp(0, h);
    let rw = (x_max - x_min).max(1) as u32;
    let rh = (y_max - y_min).max(1) as u32;

    draw_hollow_rect_mut(canvas, Rect::at(x_min, y_min).of_size(rw, rh), BOX_COLOR);
    for t in 1..(stroke as i32).min(rw as i32 / 2).min(rh as i32 / 2) {
        let rw2 = rw.saturating_sub(2 * t as u32).max(1);
        let rh2 = rh.saturating_sub(2 * t as u32).max(1);
        let inner = Rect::at(x_min + t, y_min + t).of_size(rw2, rh2);
        draw_hollow_rect_mut(canvas, inner, BOX_COLOR);
    }
}
