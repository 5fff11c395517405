use thiserror::Error;

/// Structured failures the engine distinguishes beyond plain `anyhow` context.
///
/// Most orchestration paths propagate `anyhow::Error`; these variants exist
/// for the cases callers branch on: a stored detection list that no longer
/// decodes, and a point lookup that found nothing.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("analysis {serial_number} not found")]
    AnalysisNotFound { serial_number: i64 },

    #[error("stored detections for analysis {serial_number} are malformed: {source}")]
    Decode {
        serial_number: i64,
        #[source]
        source: serde_json::Error,
    },

    #[error("detector is not ready")]
    DetectorNotReady,

    #[error("no captured image is available for inference")]
    NoPendingImage,
}
