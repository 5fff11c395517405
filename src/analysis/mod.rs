//! The analysis flow: serial allocation, detection persistence format,
//! flow state, overlay rendering, and the manager that ties them together.

pub mod annotate;
pub mod codec;
pub mod manager;
pub mod serial;
pub mod state;

pub use annotate::{AnnotatedImage, Annotator, RenderedDetection, CONFIDENCE_THRESHOLD};
pub use manager::{
    AnalysisManager, DetectorStatus, FetchedAnalysis, InferenceOutcome, SavedAnalysis,
};
pub use serial::SerialAllocator;
pub use state::{FlowState, FlowStatus};
