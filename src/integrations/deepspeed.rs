use std::path::{Path, PathBuf};

use crate::error::IntegrationError;

/// Validates that `dir` has the expected DeepSpeed layout (at least one
/// `*_model_states.pt` file directly inside it) and returns it unchanged.
pub fn locate_checkpoint_dir(dir: &Path) -> Result<PathBuf, IntegrationError> {
    let has_model_states = std::fs::read_dir(dir)
        .map(|entries| {
            entries.filter_map(Result::ok).any(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| name.ends_with("_model_states.pt"))
            })
        })
        .unwrap_or(false);

    if has_model_states {
        Ok(dir.to_path_buf())
    } else {
        Err(IntegrationError::NotFound(dir.to_path_buf()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn accepts_directory_with_model_states_file() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("mp_rank_00_model_states.pt"), b"x").unwrap();
        assert!(locate_checkpoint_dir(dir.path()).is_ok());
    }

    #[test]
    fn rejects_directory_without_model_states_file() {
        let dir = tempdir().unwrap();
        let err = locate_checkpoint_dir(dir.path()).unwrap_err();
        assert!(matches!(err, IntegrationError::NotFound(_)));
    }
}
