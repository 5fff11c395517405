//! Persisted analysis record.

use serde::{Deserialize, Serialize};

/// One saved analysis: a serialized detection list paired with the file
/// name of its annotated image. Records are immutable once inserted; the
/// only mutations the store supports are insert and delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    /// Unique identifier; also the lookup and delete key.
    pub serial_number: i64,
    /// JSON array of detection results (see `analysis::codec`). Entries
    /// below the display threshold are stored here all the same.
    pub detected_objects: String,
    /// Bare file name, resolved against the pictures directory at read time.
    pub image_reference: String,
}
