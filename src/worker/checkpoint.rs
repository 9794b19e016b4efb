use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::warn;

use crate::db::models::Checkpoint;

/// JSON checkpoint on local disk.
pub struct CheckpointFile {
    path: PathBuf,
}

impl CheckpointFile {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Read the checkpoint, starting fresh when it is missing or unreadable.
    pub fn load(&self) -> Checkpoint {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Checkpoint::new(),
            Err(e) => {
                warn!("Failed to read checkpoint {}: {}. Starting fresh.", self.path.display(), e);
                return Checkpoint::new();
            },
        };

        match serde_json::from_str(&raw) {
            Ok(checkpoint) => checkpoint,
            Err(e) => {
                warn!("Corrupt checkpoint {}: {}. Starting fresh.", self.path.display(), e);
                Checkpoint::new()
            },
        }
    }

    /// Write through a temp file and rename so a crash never leaves a
    /// half-written checkpoint behind.
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        let json = serde_json::to_string_pretty(checkpoint)?;
        let tmp = self.path.with_extension("json.tmp");

        std::fs::write(&tmp, json)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;

        Ok(())
    }
}
