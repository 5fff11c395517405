//! Image staging: unique file paths in the pictures directory, EXIF
//! orientation correction, and lossless persistence.

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use image::{DynamicImage, ImageFormat};
use log::warn;

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// What a staged file is for; determines its name prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagedImageKind {
    /// Raw camera capture, `JPEG_<ts>_*.jpg`.
    Captured,
    /// Annotated review output, `Analysed_<ts>_*.jpg`.
    Analysed,
}

impl StagedImageKind {
    fn prefix(self) -> &'static str {
        match self {
            StagedImageKind::Captured => "JPEG_",
            StagedImageKind::Analysed => "Analysed_",
        }
    }
}

/// A freshly created, empty image file.
#[derive(Debug, Clone)]
pub struct StagedImage {
    pub path: PathBuf,
    /// Bare name, the form stored in an analysis record.
    pub file_name: String,
}

#[derive(Clone)]
pub struct ImageStaging {
    pictures_dir: PathBuf,
}

impl ImageStaging {
    pub fn new(pictures_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&pictures_dir).with_context(|| {
            format!(
                "failed to create pictures directory {}",
                pictures_dir.display()
            )
        })?;
        Ok(Self { pictures_dir })
    }

    pub fn pictures_dir(&self) -> &Path {
        &self.pictures_dir
    }

    /// Creates an empty uniquely named file in the pictures directory.
    ///
    /// The timestamp in the name is informational; uniqueness comes from
    /// the filesystem's temp-file creation, so concurrent callers inside
    /// the same second still get distinct paths.
    pub fn create_unique_image_path(&self, kind: StagedImageKind) -> Result<StagedImage> {
        let timestamp = Utc::now().format(TIMESTAMP_FORMAT);
        let prefix = format!("{}{}_", kind.prefix(), timestamp);

        let file = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(".jpg")
            .tempfile_in(&self.pictures_dir)
            .with_context(|| {
                format!(
                    "failed to create staged image in {}",
                    self.pictures_dir.display()
                )
            })?;
        let (_, path) = file
            .keep()
            .context("failed to persist staged image file")?;

        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .context("staged image path has no valid file name")?
            .to_string();

        Ok(StagedImage { path, file_name })
    }

    /// Resolves a stored image reference against the pictures directory.
    pub fn resolve(&self, image_reference: &str) -> PathBuf {
        self.pictures_dir.join(image_reference)
    }
}

/// Decodes a staged file. Staged names always end in `.jpg` but annotated
/// output is written as PNG, so the format is sniffed from content rather
/// than trusted from the extension.
pub fn load_image(path: &Path) -> Result<DynamicImage> {
    image::ImageReader::open(path)
        .with_context(|| format!("failed to open image {}", path.display()))?
        .with_guessed_format()
        .with_context(|| format!("failed to probe image format of {}", path.display()))?
        .decode()
        .with_context(|| format!("failed to decode image {}", path.display()))
}

/// Reads the EXIF orientation tag (1..=8) from raw image bytes.
/// Missing EXIF data or tag counts as undefined and returns `None`.
pub fn read_orientation(bytes: &[u8]) -> Option<u32> {
    let mut cursor = Cursor::new(bytes);
    let reader = exif::Reader::new().read_from_container(&mut cursor).ok()?;
    reader
        .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|field| field.value.get_uint(0))
}

/// Applies the transform for one of the 8 standard EXIF orientation
/// values. Undefined or unrecognized values are a no-op.
pub fn apply_orientation(image: DynamicImage, orientation: Option<u32>) -> DynamicImage {
    match orientation {
        Some(2) => image.fliph(),
        Some(3) => image.rotate180(),
        Some(4) => image.flipv(),
        Some(5) => image.rotate90().fliph(),
        Some(6) => image.rotate90(),
        Some(7) => image.rotate270().fliph(),
        Some(8) => image.rotate270(),
        _ => image,
    }
}

/// Corrects orientation using the metadata embedded in the source file the
/// image was decoded from. Unreadable metadata leaves the image unchanged.
pub fn correct_orientation(image: DynamicImage, source: &Path) -> DynamicImage {
    let orientation = match fs::read(source) {
        Ok(bytes) => read_orientation(&bytes),
        Err(err) => {
            warn!(
                "Cannot read {} for orientation metadata: {err}",
                source.display()
            );
            None
        }
    };
    apply_orientation(image, orientation)
}

/// Writes pixel data losslessly (PNG) regardless of the path's extension.
pub fn persist_as_image(image: &DynamicImage, destination: &Path) -> Result<()> {
    image
        .save_with_format(destination, ImageFormat::Png)
        .with_context(|| format!("failed to write image to {}", destination.display()))
}
