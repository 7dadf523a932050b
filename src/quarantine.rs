//! Moves a confirmed-bad checkpoint aside for later inspection without
//! touching the rest of the root.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use uuid::Uuid;

use crate::error::QuarantineError;
use crate::fs::fsync_dir;

/// Renames `checkpoint` to `<root>/corrupt/<basename>-<random-hex>`, writes
/// a `reason.txt` inside it, and fsyncs the `corrupt/` directory. Returns
/// the new path.
pub fn quarantine(checkpoint: &Path, root: &Path, reason: &str) -> Result<PathBuf, QuarantineError> {
    let corrupt_dir = root.join("corrupt");
    fs::create_dir_all(&corrupt_dir)?;

    let basename = checkpoint
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "checkpoint".to_string());
    let target = corrupt_dir.join(format!("{basename}-{}", Uuid::new_v4().simple()));

    fs::rename(checkpoint, &target)?;

    let reason_path = target.join("reason.txt");
    let mut f = OpenOptions::new().create(true).write(true).truncate(true).open(&reason_path)?;
    writeln!(f, "{}Z {reason}", Utc::now().format("%Y-%m-%dT%H:%M:%S%.f"))?;
    f.sync_all()?;

    fsync_dir(&corrupt_dir)?;
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn quarantine_preserves_contents_and_writes_reason() {
        let root = tempdir().unwrap();
        let ckpt = root.path().join("step-1");
        fs::create_dir(&ckpt).unwrap();
        fs::write(ckpt.join("weights.bin"), b"abc").unwrap();

        let new_path = quarantine(&ckpt, root.path(), "hash mismatch").unwrap();

        assert!(!ckpt.exists());
        assert!(new_path.join("weights.bin").exists());
        let reason = fs::read_to_string(new_path.join("reason.txt")).unwrap();
        assert!(reason.contains("hash mismatch"));
        assert!(reason.contains('T'));
    }
}
