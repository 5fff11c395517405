use std::path::PathBuf;

use serde::Serialize;

use crate::detect::Detection;

/// Where the analysis flow currently is.
///
/// Normal path: `Idle → DetectorInitializing → DetectorReady →
/// AwaitingImage → Inferring → ReviewingResults → {Saving | Deleting} →
/// Idle`. Opening a stored record enters at `FetchingExisting` and lands in
/// a read-only `ReviewingResults` (delete offered, save not).
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum FlowStatus {
    Idle,
    DetectorInitializing,
    DetectorReady,
    AwaitingImage,
    Inferring,
    ReviewingResults,
    Saving,
    Deleting,
    FetchingExisting,
}

impl Default for FlowStatus {
    fn default() -> Self {
        FlowStatus::Idle
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowState {
    pub status: FlowStatus,
    /// Set when the flow was entered via fetch; save is not offered.
    pub read_only: bool,
    /// Serial of the record under review, once known.
    pub serial_number: Option<i64>,
    /// Captured image waiting for inference.
    pub pending_image: Option<PathBuf>,
    /// Results under review. `Some(vec![])` is a finished, empty review —
    /// distinct from a pending one, which is `None` with status `Inferring`.
    pub detections: Option<Vec<Detection>>,
}

impl FlowState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_initializing(&mut self) {
        *self = Self {
            status: FlowStatus::DetectorInitializing,
            ..Self::default()
        };
    }

    pub fn detector_ready(&mut self) {
        self.status = FlowStatus::DetectorReady;
    }

    /// A new capture starts a fresh writable flow; anything left over from
    /// a fetched record (read-only flag, serial) is discarded.
    pub fn image_staged(&mut self, path: PathBuf) {
        *self = Self {
            status: FlowStatus::AwaitingImage,
            pending_image: Some(path),
            ..Self::default()
        };
    }

    pub fn begin_inference(&mut self) {
        self.status = FlowStatus::Inferring;
        self.detections = None;
    }

    pub fn review(&mut self, detections: Vec<Detection>) {
        self.status = FlowStatus::ReviewingResults;
        self.detections = Some(detections);
    }

    pub fn begin_fetch(&mut self, serial_number: i64) {
        *self = Self {
            status: FlowStatus::FetchingExisting,
            read_only: true,
            serial_number: Some(serial_number),
            ..Self::default()
        };
    }

    pub fn begin_saving(&mut self) {
        self.status = FlowStatus::Saving;
    }

    pub fn begin_deleting(&mut self) {
        self.status = FlowStatus::Deleting;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
