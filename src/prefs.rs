use std::{
    fs,
    path::{Path, PathBuf},
    sync::RwLock,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Preferences {
    /// Absolute path of the last captured image; lets an interrupted
    /// capture → inference flow resume where it left off.
    #[serde(rename = "ImageCapturedPath")]
    image_captured_path: Option<PathBuf>,
}

/// JSON-file preference store. Reads are served from memory; every update
/// is written through immediately.
pub struct PreferenceStore {
    path: PathBuf,
    data: RwLock<Preferences>,
}

impl PreferenceStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read preferences from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            Preferences::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn image_captured_path(&self) -> Option<PathBuf> {
        self.data.read().unwrap().image_captured_path.clone()
    }

    pub fn set_image_captured_path(&self, path: &Path) -> Result<()> {
        let mut guard = self.data.write().unwrap();
        guard.image_captured_path = Some(path.to_path_buf());
        self.persist(&guard)
    }

    pub fn clear_image_captured_path(&self) -> Result<()> {
        let mut guard = self.data.write().unwrap();
        guard.image_captured_path = None;
        self.persist(&guard)
    }

    fn persist(&self, data: &Preferences) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write preferences to {}", self.path.display()))
    }
}
