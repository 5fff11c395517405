//! Serialized detection format: a JSON array of objects, each carrying a
//! label, a confidence in `[0, 1]`, and a pixel-coordinate rectangle.
//! Order is preserved end to end.

use anyhow::{Context, Result};

use crate::detect::Detection;
use crate::error::EngineError;

pub fn encode_detections(detections: &[Detection]) -> Result<String> {
    serde_json::to_string(detections).context("failed to serialize detections")
}

/// Decodes a stored detection list. Malformed text is the one fetch-time
/// failure callers branch on, so it gets its own error kind instead of an
/// unstructured fault.
pub fn decode_detections(
    serial_number: i64,
    raw: &str,
) -> std::result::Result<Vec<Detection>, EngineError> {
    serde_json::from_str(raw).map_err(|source| EngineError::Decode {
        serial_number,
        source,
    })
}
