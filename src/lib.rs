pub mod analysis;
pub mod db;
pub mod detect;
pub mod error;
pub mod gallery;
pub mod imaging;
pub mod prefs;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

pub use analysis::{
    AnalysisManager, AnnotatedImage, Annotator, DetectorStatus, FetchedAnalysis, FlowState,
    FlowStatus, InferenceOutcome, SavedAnalysis, CONFIDENCE_THRESHOLD,
};
pub use db::{Analysis, Database};
pub use detect::{BoundingBox, Detection, DetectorLoader, ObjectDetector};
pub use error::EngineError;
pub use gallery::GalleryEntry;
pub use imaging::{ImageStaging, StagedImage, StagedImageKind};
pub use prefs::PreferenceStore;

/// Initialize logging (reads RUST_LOG env var).
pub fn init_logging() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();
}

/// Filesystem layout for one engine instance.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Holds the database and preference files.
    pub data_dir: PathBuf,
    /// Where captured and annotated images are staged.
    pub pictures_dir: PathBuf,
}

impl AppConfig {
    /// Standard layout: pictures live under the data directory.
    pub fn new(data_dir: PathBuf) -> Self {
        let pictures_dir = data_dir.join("pictures");
        Self {
            data_dir,
            pictures_dir,
        }
    }
}

/// Composition root. Wires storage, preferences, image staging, and the
/// analysis manager together; the detection model comes in through the
/// [`DetectorLoader`] seam.
pub struct App {
    pub db: Database,
    pub prefs: Arc<PreferenceStore>,
    pub staging: ImageStaging,
    pub manager: AnalysisManager,
}

impl App {
    pub async fn new(config: AppConfig, loader: Arc<dyn DetectorLoader>) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir).with_context(|| {
            format!(
                "failed to create data directory {}",
                config.data_dir.display()
            )
        })?;

        let db = Database::new(config.data_dir.join("snaplens.sqlite3"))?;
        let prefs = Arc::new(PreferenceStore::new(
            config.data_dir.join("preferences.json"),
        )?);
        let staging = ImageStaging::new(config.pictures_dir)?;

        let manager =
            AnalysisManager::new(db.clone(), staging.clone(), prefs.clone(), loader).await?;

        Ok(Self {
            db,
            prefs,
            staging,
            manager,
        })
    }

    /// Gallery projection of every stored analysis. Records whose image
    /// file has vanished are skipped.
    pub async fn gallery(&self) -> Result<Vec<GalleryEntry>> {
        let records = self.db.list_analyses().await?;
        Ok(gallery::project(&records, self.staging.pictures_dir()))
    }
}
