//! Atomic checkpoint commit: crash-safe publication of a whole checkpoint
//! directory, mirroring the stage-in-temp / fsync / rename / fsync-parent
//! pattern used for the manifest snapshot, scaled up to an entire tree.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::RetentionConfig;
use crate::error::CommitError;
use crate::fs::{ensure_dir, fsync_tree, safe_remove_checkpoint, staging_dir_for, update_latest_pointer};
use crate::logging::{FieldValue, LogSink, Severity};
use crate::manifest::{self, Manifest};

/// Result of a successful commit, carried back to callers that want to
/// record metrics (total bytes, duration) without recomputing them.
pub struct CommitOutcome {
    pub manifest: Manifest,
    pub duration: std::time::Duration,
    pub total_bytes: u64,
}

/// Atomically publishes a checkpoint directory.
///
/// `writer` receives the empty staging directory and must populate it,
/// returning the manifest describing what it wrote. If the writer already
/// persisted `manifest.json` into the staging directory itself (the usual
/// case, since most writers call [`manifest::compute_manifest`] and
/// [`manifest::write_manifest`] themselves), that file is left untouched;
/// otherwise the returned manifest is persisted here.
pub fn commit<W, E>(
    dest_dir: &Path,
    writer: W,
    update_latest: bool,
    retention: Option<&RetentionConfig>,
    log: &dyn LogSink,
) -> Result<CommitOutcome, CommitError>
where
    W: FnOnce(&Path) -> Result<Manifest, E>,
    E: std::fmt::Display,
{
    let start = Instant::now();
    let parent = dest_dir.parent().unwrap_or(Path::new("."));
    ensure_dir(parent)?;

    let staging = staging_dir_for(dest_dir);
    ensure_dir(&staging)?;

    let result = run_writer(&staging, writer);
    let manifest = match result {
        Ok(m) => m,
        Err(e) => {
            let _ = safe_remove_checkpoint(&staging);
            return Err(CommitError::Writer(e));
        }
    };

    let manifest_path = manifest::manifest_path(&staging);
    if !manifest_path.is_file() {
        if let Err(e) = manifest::write_manifest(&manifest_path, &manifest) {
            let _ = safe_remove_checkpoint(&staging);
            return Err(e.into());
        }
    }

    if let Err(e) = fsync_tree(&staging) {
        let _ = safe_remove_checkpoint(&staging);
        return Err(e.into());
    }

    if let Err(e) = fs::rename(&staging, dest_dir) {
        let _ = safe_remove_checkpoint(&staging);
        return Err(e.into());
    }
    crate::fs::fsync_dir(parent)?;

    let total_bytes: u64 = manifest.files.iter().map(|f| f.size).sum();

    if update_latest {
        if let Err(e) = update_latest_pointer(parent, dest_dir) {
            log.event(
                "latest_pointer_repair_failed",
                Severity::Warn,
                &[("error", FieldValue::from(e.to_string()))],
            );
        }
    }

    if let Some(retention) = retention {
        if let Err(e) = apply_retention(parent, retention, &[dest_dir.to_path_buf()]) {
            log.event(
                "retention_failed",
                Severity::Warn,
                &[("error", FieldValue::from(e.to_string()))],
            );
        }
    }

    log.event(
        "checkpoint_written",
        Severity::Info,
        &[
            ("step", FieldValue::from(manifest.step)),
            ("path", FieldValue::from(dest_dir.to_string_lossy().into_owned())),
            ("bytes", FieldValue::from(total_bytes)),
        ],
    );

    Ok(CommitOutcome {
        manifest,
        duration: start.elapsed(),
        total_bytes,
    })
}

fn run_writer<W, E>(staging: &Path, writer: W) -> Result<Manifest, String>
where
    W: FnOnce(&Path) -> Result<Manifest, E>,
    E: std::fmt::Display,
{
    writer(staging).map_err(|e| e.to_string())
}

/// Enumerates checkpoints under `root`, keeps the union of the
/// `keep_last` highest-step checkpoints, every checkpoint whose step is a
/// multiple of `keep_every`, and any `pinned` paths, and removes the rest.
/// Best-effort: a failure removing one victim does not abort the rest.
pub fn apply_retention(
    root: &Path,
    retention: &RetentionConfig,
    pinned: &[PathBuf],
) -> std::io::Result<()> {
    let mut checkpoints = crate::fs::list_checkpoints(root)?;
    checkpoints.sort_by_key(|c| crate::fs::read_step(c));

    let n = checkpoints.len();
    let keep_last_start = n.saturating_sub(retention.keep_last);

    for (i, checkpoint) in checkpoints.iter().enumerate() {
        let step = crate::fs::read_step(checkpoint);
        let kept_by_last = i >= keep_last_start;
        let kept_by_every = retention
            .keep_every
            .map(|k| k > 0 && step >= 0 && (step as u64) % k == 0)
            .unwrap_or(false);
        let kept_by_pin = pinned.iter().any(|p| p == checkpoint);

        if kept_by_last || kept_by_every || kept_by_pin {
            continue;
        }
        let _ = safe_remove_checkpoint(checkpoint);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::TracingSink;
    use crate::manifest::{compute_manifest, write_manifest, ComputeManifestArgs};
    use crate::clock::{SystemClock, OsHostname};
    use tempfile::tempdir;

    #[derive(Debug)]
    struct Boom;
    impl std::fmt::Display for Boom {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "boom")
        }
    }

    #[test]
    fn crashing_writer_leaves_no_trace() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("step-1");

        let result = commit(
            &dest,
            |staging| -> Result<Manifest, Boom> {
                fs::write(staging.join("file.bin"), b"hello").unwrap();
                Err(Boom)
            },
            false,
            None,
            &TracingSink,
        );

        assert!(result.is_err());
        assert!(!dest.exists());
        let siblings: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert!(siblings.is_empty(), "no staging directory should remain");
    }

    fn make_writer(step: u64) -> impl FnOnce(&Path) -> Result<Manifest, std::io::Error> {
        move |staging: &Path| {
            fs::write(staging.join("state.json"), format!("{{\"step\":{step}}}"))?;
            let manifest = compute_manifest(
                staging,
                ComputeManifestArgs {
                    job_id: "job",
                    run_id: "run",
                    step,
                    world_size: 1,
                    framework: None,
                    precision: None,
                    model_name: None,
                    sample_bytes: None,
                    threads: 2,
                    ignore_names: &[],
                },
                &SystemClock,
                &OsHostname,
            )
            .map_err(|e| std::io::Error::other(e.to_string()))?;
            write_manifest(&manifest::manifest_path(staging), &manifest)
                .map_err(|e| std::io::Error::other(e.to_string()))?;
            Ok(manifest)
        }
    }

    #[test]
    fn retention_and_latest_survive_sequential_commits() {
        let dir = tempdir().unwrap();
        let retention = RetentionConfig { keep_last: 1, keep_every: None };

        let ckpt1 = dir.path().join("step-1");
        commit(&ckpt1, make_writer(1), true, Some(&retention), &TracingSink).unwrap();
        let ckpt2 = dir.path().join("step-2");
        commit(&ckpt2, make_writer(2), true, Some(&retention), &TracingSink).unwrap();

        assert!(!ckpt1.exists());
        assert!(ckpt2.exists());
        let latest_link = dir.path().join("latest");
        let latest_json = dir.path().join("latest.json");
        assert!(latest_link.exists() || latest_json.exists());
    }
}
