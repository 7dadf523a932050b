//! Deterministic integrity diagnosis of a single checkpoint.

use std::path::{Path, PathBuf};

use regex::Regex;

use crate::error::ValidateError;
use crate::hashing::compute_sha256;
use crate::manifest::{self, Manifest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    ManifestMissing,
    ManifestSchemaInvalid,
    FileMissing,
    SizeMismatch,
    HashMismatch,
    ZeroSizedFile,
    SplitBrainStepMismatch,
}

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::ManifestMissing => "manifest_missing",
            Reason::ManifestSchemaInvalid => "manifest_schema_invalid",
            Reason::FileMissing => "file_missing",
            Reason::SizeMismatch => "size_mismatch",
            Reason::HashMismatch => "hash_mismatch",
            Reason::ZeroSizedFile => "zero_sized_file",
            Reason::SplitBrainStepMismatch => "split_brain_step_mismatch",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Issue {
    pub reason: Reason,
    pub detail: String,
    pub path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub checkpoint: PathBuf,
    pub valid: bool,
    pub issues: Vec<Issue>,
    pub manifest: Option<Manifest>,
}

impl ValidationResult {
    pub fn summary(&self) -> String {
        if self.valid {
            format!("{}: OK", self.checkpoint.display())
        } else {
            let reasons: Vec<&str> = self.issues.iter().map(|i| i.reason.as_str()).collect();
            format!("{}: INVALID ({})", self.checkpoint.display(), reasons.join(", "))
        }
    }
}

/// Validates a single checkpoint directory against its manifest.
///
/// Checks run in a fixed order: manifest presence, manifest parse,
/// split-brain step match, per-file presence/size, then hashes. Later
/// checks still run even after an earlier one fails, except that a file
/// already reported missing is not also hashed.
pub fn validate(
    checkpoint: &Path,
    full_hash: bool,
    sample_bytes: Option<u64>,
) -> Result<ValidationResult, ValidateError> {
    let mut issues = Vec::new();
    let manifest_path = manifest::manifest_path(checkpoint);

    if !manifest_path.is_file() {
        issues.push(Issue {
            reason: Reason::ManifestMissing,
            detail: format!("{} does not exist", manifest_path.display()),
            path: None,
        });
        return Ok(ValidationResult {
            checkpoint: checkpoint.to_path_buf(),
            valid: false,
            issues,
            manifest: None,
        });
    }

    let manifest = match manifest::read_manifest(&manifest_path) {
        Ok(m) => m,
        Err(e) => {
            issues.push(Issue {
                reason: Reason::ManifestSchemaInvalid,
                detail: e.to_string(),
                path: None,
            });
            return Ok(ValidationResult {
                checkpoint: checkpoint.to_path_buf(),
                valid: false,
                issues,
                manifest: None,
            });
        }
    };

    if let Some(name_step) = first_integer_in_name(checkpoint) {
        if name_step != manifest.step {
            issues.push(Issue {
                reason: Reason::SplitBrainStepMismatch,
                detail: format!(
                    "directory name implies step {name_step} but manifest says {}",
                    manifest.step
                ),
                path: None,
            });
        }
    }

    let mut hashable = Vec::new();
    for entry in &manifest.files {
        let file_path = checkpoint.join(&entry.path);
        if !file_path.is_file() {
            issues.push(Issue {
                reason: Reason::FileMissing,
                detail: format!("{} is missing", entry.path),
                path: Some(entry.path.clone()),
            });
            continue;
        }
        let actual_size = file_path.metadata()?.len();
        if actual_size == 0 {
            issues.push(Issue {
                reason: Reason::ZeroSizedFile,
                detail: format!("{} is zero bytes", entry.path),
                path: Some(entry.path.clone()),
            });
        }
        if actual_size != entry.size {
            issues.push(Issue {
                reason: Reason::SizeMismatch,
                detail: format!(
                    "{} is {actual_size} bytes, manifest says {}",
                    entry.path, entry.size
                ),
                path: Some(entry.path.clone()),
            });
        }
        hashable.push((file_path, entry.path.clone(), entry.sha256.clone()));
    }

    if full_hash || sample_bytes.is_some() {
        let effective_sample = if full_hash { None } else { sample_bytes };
        for (file_path, rel_path, expected) in &hashable {
            let actual = compute_sha256(file_path, effective_sample)
                .map_err(|e| std::io::Error::other(e.to_string()))?;
            if &actual != expected {
                issues.push(Issue {
                    reason: Reason::HashMismatch,
                    detail: format!("{rel_path} hash mismatch"),
                    path: Some(rel_path.clone()),
                });
            }
        }
    }

    Ok(ValidationResult {
        checkpoint: checkpoint.to_path_buf(),
        valid: issues.is_empty(),
        issues,
        manifest: Some(manifest),
    })
}

/// Returns the integer formed by the first run of decimal digits anywhere
/// in the checkpoint directory's basename, if any. `step-3` yields `3`;
/// `2024-step-3` yields `2024`, matching the first match rather than the
/// last or a `step-<N>`-anchored one.
fn first_integer_in_name(checkpoint: &Path) -> Option<u64> {
    let name = checkpoint.file_name()?.to_str()?;
    let re = Regex::new(r"(\d+)").expect("static pattern is valid");
    let m = re.find(name)?;
    m.as_str().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{SystemClock, OsHostname};
    use crate::manifest::{compute_manifest, write_manifest, ComputeManifestArgs};
    use tempfile::tempdir;

    fn write_checkpoint(dir: &Path, step: u64, file_contents: &[u8]) -> Manifest {
        std::fs::write(dir.join("weights.bin"), file_contents).unwrap();
        let manifest = compute_manifest(
            dir,
            ComputeManifestArgs {
                job_id: "job",
                run_id: "run",
                step,
                world_size: 1,
                framework: None,
                precision: None,
                model_name: None,
                sample_bytes: None,
                threads: 1,
                ignore_names: &[],
            },
            &SystemClock,
            &OsHostname,
        )
        .unwrap();
        write_manifest(&manifest::manifest_path(dir), &manifest).unwrap();
        manifest
    }

    #[test]
    fn clean_checkpoint_validates() {
        let dir = tempdir().unwrap();
        write_checkpoint(dir.path(), 1, b"abc");
        let result = validate(dir.path(), true, None).unwrap();
        assert!(result.valid, "{:?}", result.issues);
    }

    #[test]
    fn tampered_file_is_hash_mismatch() {
        let dir = tempdir().unwrap();
        write_checkpoint(dir.path(), 1, b"abc");
        std::fs::write(dir.path().join("weights.bin"), b"bad").unwrap();

        let result = validate(dir.path(), true, None).unwrap();
        assert!(!result.valid);
        assert!(result.issues.iter().any(|i| i.reason == Reason::SizeMismatch));
    }

    #[test]
    fn same_size_tamper_is_hash_mismatch_not_size() {
        let dir = tempdir().unwrap();
        write_checkpoint(dir.path(), 1, b"abc");
        std::fs::write(dir.path().join("weights.bin"), b"xyz").unwrap();

        let result = validate(dir.path(), true, None).unwrap();
        assert!(!result.valid);
        assert!(result.issues.iter().any(|i| i.reason == Reason::HashMismatch));
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = tempdir().unwrap();
        write_checkpoint(dir.path(), 1, b"abc");
        std::fs::remove_file(dir.path().join("weights.bin")).unwrap();

        let result = validate(dir.path(), true, None).unwrap();
        assert!(!result.valid);
        assert!(result.issues.iter().any(|i| i.reason == Reason::FileMissing));
    }

    #[test]
    fn missing_manifest_is_reported() {
        let dir = tempdir().unwrap();
        let result = validate(dir.path(), false, None).unwrap();
        assert!(!result.valid);
        assert_eq!(result.issues[0].reason, Reason::ManifestMissing);
        assert!(result.manifest.is_none());
    }

    #[test]
    fn split_brain_uses_first_digit_run() {
        let dir = tempdir().unwrap();
        let ckpt = dir.path().join("2024-step-3");
        std::fs::create_dir(&ckpt).unwrap();
        write_checkpoint(&ckpt, 3, b"abc");

        let result = validate(&ckpt, false, None).unwrap();
        assert!(result.issues.iter().any(|i| i.reason == Reason::SplitBrainStepMismatch));
    }
}
