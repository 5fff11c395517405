//! Detection provider seam.
//!
//! The object-detection model itself is an external collaborator: the
//! embedder supplies a [`DetectorLoader`] that knows how to bring a model
//! up (file paths, accelerator setup, label maps), and the engine only
//! consumes the [`ObjectDetector`] it produces.

use anyhow::Result;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl BoundingBox {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> f32 {
        (self.right - self.left).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.bottom - self.top).max(0.0)
    }
}

/// One recognized object instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Detection {
    pub label: String,
    /// Confidence score in `[0, 1]`.
    pub confidence: f32,
    #[serde(rename = "box")]
    pub bounding_box: BoundingBox,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f32, bounding_box: BoundingBox) -> Self {
        Self {
            label: label.into(),
            confidence,
            bounding_box,
        }
    }
}

/// A loaded detection model. Output order is the model's ranking order and
/// is preserved through persistence.
pub trait ObjectDetector: Send + Sync {
    fn recognize(&self, image: &DynamicImage) -> Result<Vec<Detection>>;
}

/// Brings a model up from its backing assets. Loading can be slow (weights,
/// label files), so the lifecycle manager runs it on a blocking task.
pub trait DetectorLoader: Send + Sync {
    fn load(&self) -> Result<Box<dyn ObjectDetector>>;
}

impl<F> DetectorLoader for F
where
    F: Fn() -> Result<Box<dyn ObjectDetector>> + Send + Sync,
{
    fn load(&self) -> Result<Box<dyn ObjectDetector>> {
        self()
    }
}
