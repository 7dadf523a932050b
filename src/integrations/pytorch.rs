use std::path::{Path, PathBuf};

use crate::error::IntegrationError;

const CANDIDATE_NAMES: &[&str] = &["model.pt", "pytorch_model.bin", "model.bin"];

/// Returns the first PyTorch-shaped checkpoint file found directly inside
/// `dir`, checked in a fixed preference order.
pub fn locate_checkpoint_file(dir: &Path) -> Result<PathBuf, IntegrationError> {
    for name in CANDIDATE_NAMES {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Ok(candidate);
        }
    }
    Err(IntegrationError::NotFound(dir.to_path_buf()))
}
