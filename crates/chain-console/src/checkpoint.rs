//! JSON checkpoints of a model's chains.

use std::fs;
use std::path::{Path, PathBuf};

use chain_core::{ConsoleError, ErrorInfo, HostState};
use serde::{Deserialize, Serialize};

/// Everything needed to continue a model's chains: unobserved values and
/// generator name and state per chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCheckpoint {
    /// Iterations completed when the checkpoint was taken.
    pub iteration: u64,
    /// Parameter state of each chain, in chain order.
    pub chains: Vec<HostState>,
}

impl ModelCheckpoint {
    /// Restores a checkpoint from disk.
    pub fn load(path: &Path) -> Result<Self, ConsoleError> {
        let contents = fs::read_to_string(path).map_err(|err| ConsoleError::io(path, &err))?;
        serde_json::from_str(&contents).map_err(|err| {
            ConsoleError::Conversion(
                ErrorInfo::new("checkpoint.parse", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })
    }

    /// Writes the checkpoint to disk, creating parent directories.
    pub fn store(&self, path: &Path) -> Result<(), ConsoleError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| ConsoleError::io(parent, &err))?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|err| {
            ConsoleError::Conversion(
                ErrorInfo::new("checkpoint.serialize", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        fs::write(path, json).map_err(|err| ConsoleError::io(path, &err))
    }
}

/// Conventional checkpoint location for iteration `iteration` under `dir`.
pub fn checkpoint_path(dir: &Path, iteration: u64) -> PathBuf {
    dir.join(format!("checkpoint_{iteration:08}.json"))
}
