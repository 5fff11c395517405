use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use image::DynamicImage;
use log::{error, info};
use tokio::sync::{watch, Mutex};

use crate::analysis::codec;
use crate::analysis::serial::SerialAllocator;
use crate::analysis::state::FlowState;
use crate::db::{Analysis, Database};
use crate::detect::{Detection, DetectorLoader, ObjectDetector};
use crate::error::EngineError;
use crate::imaging::{self, ImageStaging, StagedImage, StagedImageKind};
use crate::prefs::PreferenceStore;

/// Published on the readiness channel while the detector loads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectorStatus {
    Unloaded,
    Initializing,
    Ready,
    /// Terminal for this attempt; the flow restarts at capture. Carries the
    /// load error's message.
    Failed(String),
}

/// Result of one inference pass: the orientation-corrected image and the
/// model's ordered detections. An empty list is a finished result, not an
/// error.
#[derive(Debug)]
pub struct InferenceOutcome {
    pub image: DynamicImage,
    pub detections: Vec<Detection>,
}

/// A stored analysis reconstructed for review. The flow is read-only from
/// here: delete is offered, save is not.
#[derive(Debug, Clone)]
pub struct FetchedAnalysis {
    pub serial_number: i64,
    pub detections: Vec<Detection>,
    pub image_reference: String,
    pub image_path: PathBuf,
}

/// A freshly persisted analysis.
#[derive(Debug, Clone)]
pub struct SavedAnalysis {
    pub serial_number: i64,
    pub image_reference: String,
    pub image_path: PathBuf,
}

/// Orchestrates the capture → inference → review → save/delete flow.
///
/// Everything slow runs off the caller's context: the detector loads on a
/// blocking task, inference runs on a blocking task, and storage goes
/// through the database worker thread. Outcomes come back as `Result`s;
/// detector readiness is additionally published on a watch channel for
/// observers that outlive a single call.
pub struct AnalysisManager {
    state: Mutex<FlowState>,
    db: Database,
    staging: ImageStaging,
    prefs: Arc<PreferenceStore>,
    serials: SerialAllocator,
    loader: Arc<dyn DetectorLoader>,
    detector: Mutex<Option<Arc<dyn ObjectDetector>>>,
    readiness: watch::Sender<DetectorStatus>,
}

impl AnalysisManager {
    pub async fn new(
        db: Database,
        staging: ImageStaging,
        prefs: Arc<PreferenceStore>,
        loader: Arc<dyn DetectorLoader>,
    ) -> Result<Self> {
        let serials = SerialAllocator::new();
        if let Some(max) = db.max_serial_number().await? {
            serials.reseed_above(max);
        }

        let (readiness, _) = watch::channel(DetectorStatus::Unloaded);

        Ok(Self {
            state: Mutex::new(FlowState::new()),
            db,
            staging,
            prefs,
            serials,
            loader,
            detector: Mutex::new(None),
            readiness,
        })
    }

    /// Current flow state snapshot.
    pub async fn state(&self) -> FlowState {
        self.state.lock().await.clone()
    }

    /// Detector readiness channel; drop the receiver to unsubscribe.
    pub fn subscribe_readiness(&self) -> watch::Receiver<DetectorStatus> {
        self.readiness.subscribe()
    }

    /// Loads the detection model on a blocking task. Success is signaled on
    /// the readiness channel and by the returned `Ok`; failure is terminal
    /// for this attempt and is never retried internally.
    pub async fn initialize_detector(&self) -> Result<()> {
        self.state.lock().await.begin_initializing();
        let _ = self.readiness.send(DetectorStatus::Initializing);

        let loader = self.loader.clone();
        let loaded = tokio::task::spawn_blocking(move || loader.load())
            .await
            .context("detector load task panicked")?;

        match loaded {
            Ok(detector) => {
                *self.detector.lock().await = Some(Arc::from(detector));
                self.state.lock().await.detector_ready();
                let _ = self.readiness.send(DetectorStatus::Ready);
                info!("Detector initialization success");
                Ok(())
            }
            Err(err) => {
                self.state.lock().await.reset();
                let _ = self
                    .readiness
                    .send(DetectorStatus::Failed(err.to_string()));
                error!("Error initializing detector: {err:#}");
                Err(err)
            }
        }
    }

    /// Creates a unique capture target in the pictures directory and
    /// remembers it in preferences so an interrupted flow can resume.
    pub async fn stage_capture(&self) -> Result<StagedImage> {
        let staged = self
            .staging
            .create_unique_image_path(StagedImageKind::Captured)?;
        self.prefs.set_image_captured_path(&staged.path)?;
        self.state.lock().await.image_staged(staged.path.clone());
        Ok(staged)
    }

    /// Re-adopts the last captured image recorded in preferences, if its
    /// file still exists. Returns the pending path, or `None` when there is
    /// nothing to resume.
    pub async fn resume_captured_image(&self) -> Result<Option<PathBuf>> {
        let Some(path) = self.prefs.image_captured_path() else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }

        self.state.lock().await.image_staged(path.clone());
        Ok(Some(path))
    }

    /// Runs the detector over the pending captured image: decode, correct
    /// orientation from embedded metadata, recognize. Requires a ready
    /// detector and a staged image.
    pub async fn run_inference(&self) -> Result<InferenceOutcome> {
        let detector = self
            .detector
            .lock()
            .await
            .clone()
            .ok_or(EngineError::DetectorNotReady)?;

        let image_path = {
            let mut state = self.state.lock().await;
            let path = state
                .pending_image
                .clone()
                .ok_or(EngineError::NoPendingImage)?;
            state.begin_inference();
            path
        };

        let path_for_task = image_path.clone();
        let outcome = tokio::task::spawn_blocking(move || -> Result<InferenceOutcome> {
            let image = imaging::load_image(&path_for_task)?;
            let image = imaging::correct_orientation(image, &path_for_task);
            let detections = detector.recognize(&image)?;
            Ok(InferenceOutcome { image, detections })
        })
        .await
        .context("inference task panicked")?;

        let mut state = self.state.lock().await;
        match outcome {
            Ok(outcome) => {
                info!(
                    "Inference produced {} detections for {}",
                    outcome.detections.len(),
                    image_path.display()
                );
                state.review(outcome.detections.clone());
                Ok(outcome)
            }
            Err(err) => {
                // The capture is still usable; leave it staged for a retry.
                state.image_staged(image_path);
                Err(err)
            }
        }
    }

    /// Persists reviewed detections under a freshly allocated serial.
    /// The detection list may be empty. Success means the store returned a
    /// valid identifier.
    pub async fn save_analysis(
        &self,
        detections: &[Detection],
        image_file_name: &str,
    ) -> Result<i64> {
        {
            let mut state = self.state.lock().await;
            if state.read_only {
                bail!("fetched analyses are read-only; only delete is offered");
            }
            state.begin_saving();
        }

        let serial_number = self.serials.allocate();
        let analysis = Analysis {
            serial_number,
            detected_objects: codec::encode_detections(detections)?,
            image_reference: image_file_name.to_string(),
        };

        let inserted = self.db.insert_analysis(&analysis).await;
        let mut state = self.state.lock().await;
        match inserted {
            Ok(id) => {
                state.reset();
                info!("Saved analysis {id} with image {image_file_name}");
                Ok(id)
            }
            Err(err) => {
                // Back to review; retrying is the user's call.
                state.review(detections.to_vec());
                Err(err)
            }
        }
    }

    /// Full save path for a reviewed image: stage an `Analysed_` file,
    /// write the annotated pixels losslessly, then persist the record
    /// referencing that file name.
    pub async fn save_annotated_analysis(
        &self,
        annotated: &DynamicImage,
        detections: &[Detection],
    ) -> Result<SavedAnalysis> {
        let staged = self
            .staging
            .create_unique_image_path(StagedImageKind::Analysed)?;
        imaging::persist_as_image(annotated, &staged.path)?;

        let serial_number = self.save_analysis(detections, &staged.file_name).await?;
        Ok(SavedAnalysis {
            serial_number,
            image_reference: staged.file_name,
            image_path: staged.path,
        })
    }

    /// Deletes by serial number. `Ok(true)` iff exactly one row was
    /// removed; a missing record is `Ok(false)`, not an error.
    pub async fn delete_analysis(&self, serial_number: i64) -> Result<bool> {
        let previous = {
            let mut state = self.state.lock().await;
            let previous = state.detections.clone();
            state.begin_deleting();
            previous
        };

        let removed = self.db.delete_analysis(serial_number).await;
        let mut state = self.state.lock().await;
        match removed {
            Ok(count) => {
                state.reset();
                if count == 1 {
                    info!("Deleted analysis {serial_number}");
                }
                Ok(count == 1)
            }
            Err(err) => {
                if let Some(detections) = previous {
                    state.review(detections);
                }
                Err(err)
            }
        }
    }

    /// Loads a stored analysis for read-only review: decodes its detection
    /// list and resolves the annotated image against the pictures
    /// directory. Malformed stored detections surface as
    /// [`EngineError::Decode`].
    pub async fn fetch_analysis(&self, serial_number: i64) -> Result<FetchedAnalysis> {
        self.state.lock().await.begin_fetch(serial_number);

        let record = self.db.get_analysis(serial_number).await?;
        let Some(record) = record else {
            self.state.lock().await.reset();
            return Err(EngineError::AnalysisNotFound { serial_number }.into());
        };

        let detections = match codec::decode_detections(serial_number, &record.detected_objects) {
            Ok(detections) => detections,
            Err(err) => {
                self.state.lock().await.reset();
                return Err(err.into());
            }
        };
        let image_path = self.staging.resolve(&record.image_reference);

        self.state.lock().await.review(detections.clone());
        Ok(FetchedAnalysis {
            serial_number,
            detections,
            image_reference: record.image_reference,
            image_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::state::FlowStatus;
    use crate::detect::stubs::{FailingLoader, FixedDetector};
    use crate::detect::BoundingBox;
    use image::{Rgba, RgbaImage};
    use tempfile::TempDir;

    fn fixed_loader(detections: Vec<Detection>) -> Arc<dyn DetectorLoader> {
        Arc::new(move || -> Result<Box<dyn ObjectDetector>> {
            Ok(Box::new(FixedDetector {
                detections: detections.clone(),
            }))
        })
    }

    fn cat_and_dog() -> Vec<Detection> {
        vec![
            Detection::new("cat", 0.9, BoundingBox::new(0.0, 0.0, 10.0, 10.0)),
            Detection::new("dog", 0.2, BoundingBox::new(5.0, 5.0, 15.0, 15.0)),
        ]
    }

    async fn manager_with(loader: Arc<dyn DetectorLoader>) -> (TempDir, AnalysisManager) {
        let dir = TempDir::new().unwrap();
        let db = Database::new(dir.path().join("snaplens.sqlite3")).unwrap();
        let staging = ImageStaging::new(dir.path().join("pictures")).unwrap();
        let prefs = Arc::new(PreferenceStore::new(dir.path().join("prefs.json")).unwrap());

        let manager = AnalysisManager::new(db, staging, prefs, loader)
            .await
            .unwrap();
        (dir, manager)
    }

    fn tiny_image() -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([9, 9, 9, 255])))
    }

    #[tokio::test]
    async fn initialize_signals_ready() {
        let (_dir, manager) = manager_with(fixed_loader(vec![])).await;
        let mut rx = manager.subscribe_readiness();

        manager.initialize_detector().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), DetectorStatus::Ready);
        assert_eq!(manager.state().await.status, FlowStatus::DetectorReady);
    }

    #[tokio::test]
    async fn failed_load_signals_failure_and_errors() {
        let (_dir, manager) = manager_with(Arc::new(FailingLoader)).await;
        let mut rx = manager.subscribe_readiness();

        assert!(manager.initialize_detector().await.is_err());
        assert!(matches!(
            *rx.borrow_and_update(),
            DetectorStatus::Failed(_)
        ));
        assert_eq!(manager.state().await.status, FlowStatus::Idle);
    }

    #[tokio::test]
    async fn inference_requires_a_ready_detector() {
        let (_dir, manager) = manager_with(fixed_loader(vec![])).await;

        let err = manager.run_inference().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::DetectorNotReady)
        ));
    }

    #[tokio::test]
    async fn inference_requires_a_pending_image() {
        let (_dir, manager) = manager_with(fixed_loader(vec![])).await;
        manager.initialize_detector().await.unwrap();

        let err = manager.run_inference().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::NoPendingImage)
        ));
    }

    #[tokio::test]
    async fn capture_inference_review_flow() {
        let (_dir, manager) = manager_with(fixed_loader(cat_and_dog())).await;
        manager.initialize_detector().await.unwrap();

        let staged = manager.stage_capture().await.unwrap();
        imaging::persist_as_image(&tiny_image(), &staged.path).unwrap();

        let outcome = manager.run_inference().await.unwrap();
        assert_eq!(outcome.detections, cat_and_dog());

        let state = manager.state().await;
        assert_eq!(state.status, FlowStatus::ReviewingResults);
        assert!(!state.read_only);
    }

    #[tokio::test]
    async fn empty_inference_is_a_finished_review() {
        let (_dir, manager) = manager_with(fixed_loader(vec![])).await;
        manager.initialize_detector().await.unwrap();

        let staged = manager.stage_capture().await.unwrap();
        imaging::persist_as_image(&tiny_image(), &staged.path).unwrap();

        let outcome = manager.run_inference().await.unwrap();
        assert!(outcome.detections.is_empty());

        let state = manager.state().await;
        assert_eq!(state.status, FlowStatus::ReviewingResults);
        assert_eq!(state.detections, Some(vec![]));
    }

    #[tokio::test]
    async fn save_then_fetch_round_trips() {
        let (_dir, manager) = manager_with(fixed_loader(vec![])).await;

        let serial = manager
            .save_analysis(&cat_and_dog(), "img1.jpg")
            .await
            .unwrap();

        let fetched = manager.fetch_analysis(serial).await.unwrap();
        assert_eq!(fetched.detections, cat_and_dog());
        assert_eq!(fetched.image_reference, "img1.jpg");
        assert!(fetched.image_path.ends_with("img1.jpg"));

        let state = manager.state().await;
        assert_eq!(state.status, FlowStatus::ReviewingResults);
        assert!(state.read_only);
    }

    #[tokio::test]
    async fn empty_detection_list_round_trips() {
        let (_dir, manager) = manager_with(fixed_loader(vec![])).await;

        let serial = manager.save_analysis(&[], "img2.jpg").await.unwrap();
        let fetched = manager.fetch_analysis(serial).await.unwrap();
        assert!(fetched.detections.is_empty());
    }

    #[tokio::test]
    async fn delete_then_fetch_is_not_found() {
        let (_dir, manager) = manager_with(fixed_loader(vec![])).await;

        let serial = manager.save_analysis(&cat_and_dog(), "img1.jpg").await.unwrap();
        assert!(manager.delete_analysis(serial).await.unwrap());

        let err = manager.fetch_analysis(serial).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::AnalysisNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn delete_of_unknown_serial_reports_false() {
        let (_dir, manager) = manager_with(fixed_loader(vec![])).await;
        assert!(!manager.delete_analysis(12345).await.unwrap());
    }

    #[tokio::test]
    async fn consecutive_saves_get_distinct_serials() {
        let (_dir, manager) = manager_with(fixed_loader(vec![])).await;

        let first = manager.save_analysis(&[], "a.jpg").await.unwrap();
        let second = manager.save_analysis(&[], "b.jpg").await.unwrap();
        assert_ne!(first, second);
        assert!(second > first);
    }

    #[tokio::test]
    async fn capture_after_fetch_starts_a_writable_flow() {
        let (_dir, manager) = manager_with(fixed_loader(cat_and_dog())).await;
        manager.initialize_detector().await.unwrap();

        let serial = manager.save_analysis(&cat_and_dog(), "img1.jpg").await.unwrap();
        manager.fetch_analysis(serial).await.unwrap();
        assert!(manager.state().await.read_only);

        // Viewing a stored record must not poison the next capture flow.
        let staged = manager.stage_capture().await.unwrap();
        imaging::persist_as_image(&tiny_image(), &staged.path).unwrap();
        let outcome = manager.run_inference().await.unwrap();

        let saved = manager
            .save_analysis(&outcome.detections, &staged.file_name)
            .await
            .unwrap();
        assert!(saved > serial);
        assert!(!manager.state().await.read_only);
    }

    #[tokio::test]
    async fn fetched_flow_rejects_save() {
        let (_dir, manager) = manager_with(fixed_loader(vec![])).await;

        let serial = manager.save_analysis(&cat_and_dog(), "img1.jpg").await.unwrap();
        manager.fetch_analysis(serial).await.unwrap();

        assert!(manager
            .save_analysis(&cat_and_dog(), "img3.jpg")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn malformed_stored_detections_surface_as_decode_error() {
        let dir = TempDir::new().unwrap();
        let db = Database::new(dir.path().join("snaplens.sqlite3")).unwrap();
        let staging = ImageStaging::new(dir.path().join("pictures")).unwrap();
        let prefs = Arc::new(PreferenceStore::new(dir.path().join("prefs.json")).unwrap());

        db.insert_analysis(&Analysis {
            serial_number: 99,
            detected_objects: "{definitely not json".into(),
            image_reference: "img.jpg".into(),
        })
        .await
        .unwrap();

        let manager = AnalysisManager::new(db, staging, prefs, fixed_loader(vec![]))
            .await
            .unwrap();

        let err = manager.fetch_analysis(99).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::Decode {
                serial_number: 99,
                ..
            })
        ));

        // The failed fetch must not leave a stuck read-only flow behind.
        let state = manager.state().await;
        assert_eq!(state.status, FlowStatus::Idle);
        assert!(!state.read_only);
    }

    #[tokio::test]
    async fn allocator_reseeds_above_existing_records() {
        let dir = TempDir::new().unwrap();
        let db = Database::new(dir.path().join("snaplens.sqlite3")).unwrap();
        let staging = ImageStaging::new(dir.path().join("pictures")).unwrap();
        let prefs = Arc::new(PreferenceStore::new(dir.path().join("prefs.json")).unwrap());

        // A serial far in the future, as if the clock had run ahead.
        db.insert_analysis(&Analysis {
            serial_number: 99990101000000,
            detected_objects: "[]".into(),
            image_reference: "img.jpg".into(),
        })
        .await
        .unwrap();

        let manager = AnalysisManager::new(db, staging, prefs, fixed_loader(vec![]))
            .await
            .unwrap();
        let serial = manager.save_analysis(&[], "img2.jpg").await.unwrap();
        assert!(serial > 99990101000000);
    }

    #[tokio::test]
    async fn resume_returns_pending_capture_only_while_it_exists() {
        let (_dir, manager) = manager_with(fixed_loader(vec![])).await;

        assert!(manager.resume_captured_image().await.unwrap().is_none());

        let staged = manager.stage_capture().await.unwrap();
        let resumed = manager.resume_captured_image().await.unwrap();
        assert_eq!(resumed, Some(staged.path.clone()));

        std::fs::remove_file(&staged.path).unwrap();
        assert!(manager.resume_captured_image().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_annotated_analysis_writes_file_and_record() {
        let (_dir, manager) = manager_with(fixed_loader(vec![])).await;

        let saved = manager
            .save_annotated_analysis(&tiny_image(), &cat_and_dog())
            .await
            .unwrap();
        assert!(saved.image_path.exists());
        assert!(saved.image_reference.starts_with("Analysed_"));

        let fetched = manager.fetch_analysis(saved.serial_number).await.unwrap();
        assert_eq!(fetched.detections, cat_and_dog());
        assert_eq!(fetched.image_path, saved.image_path);
    }
}
