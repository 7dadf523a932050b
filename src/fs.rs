//! Filesystem primitives: directory fsync, atomic pointer publication,
//! checkpoint enumeration, and safe removal.
//!
//! The durability pattern here (write to a uniquely-named temp path in the
//! same directory, fsync, rename over the final name, fsync the parent) is
//! the same one the commit path uses for whole checkpoints — it just
//! operates on a single small file instead of a tree.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use rand::Rng;

use crate::manifest::{self, MANIFEST_NAME};

/// Creates `dir` and all of its parents if they do not already exist.
pub fn ensure_dir(dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dir)
}

/// Fsyncs a single directory handle. A no-op error path if the platform or
/// filesystem does not support syncing directory metadata is deliberately
/// not swallowed here; callers that can tolerate it do so explicitly.
pub fn fsync_dir(dir: &Path) -> std::io::Result<()> {
    let dir_file = File::open(dir)?;
    dir_file.sync_all()
}

/// Recursively fsyncs every regular file under `root`, then every directory
/// (innermost first is not required since fsyncing a directory only makes
/// its own entries durable, not its descendants' contents).
pub fn fsync_tree(root: &Path) -> std::io::Result<()> {
    fsync_tree_inner(root)?;
    fsync_dir(root)
}

fn fsync_tree_inner(dir: &Path) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            fsync_tree_inner(&path)?;
            fsync_dir(&path)?;
        } else if file_type.is_file() {
            let f = File::open(&path)?;
            f.sync_all()?;
        }
    }
    Ok(())
}

/// Returns free space in bytes on the filesystem backing `path`.
pub fn disk_free_bytes(path: &Path) -> std::io::Result<u64> {
    let probe = if path.exists() {
        path.to_path_buf()
    } else {
        path.parent().unwrap_or(Path::new(".")).to_path_buf()
    };
    fs2::available_space(&probe)
}

/// Returns the checkpoint subdirectories of `root`, in lexicographic order.
/// A child qualifies iff it is a real (non-symlink) directory containing a
/// `manifest.json` file.
pub fn list_checkpoints(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    if !root.exists() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_symlink() || !file_type.is_dir() {
            continue;
        }
        let path = entry.path();
        if path.join(MANIFEST_NAME).is_file() {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}

/// Best-effort parse of a checkpoint's step, used by callers that need a
/// sort key but can tolerate unreadable manifests. Returns `-1` on any
/// failure to read or parse.
pub fn read_step(checkpoint: &Path) -> i64 {
    match manifest::read_manifest(&manifest::manifest_path(checkpoint)) {
        Ok(m) => m.step as i64,
        Err(_) => -1,
    }
}

fn tmp_name(prefix: &str) -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::rng();
    let suffix: String = (0..6)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect();
    format!(".{prefix}.tmp-{suffix}")
}

/// Returns a staging directory path that does not yet exist, as a sibling
/// of `dest_dir` sharing its basename as a prefix.
pub fn staging_dir_for(dest_dir: &Path) -> PathBuf {
    let parent = dest_dir.parent().unwrap_or(Path::new("."));
    let basename = dest_dir
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("checkpoint");
    parent.join(tmp_name(basename))
}

/// Publishes `target` (a checkpoint directory under `root`) as the current
/// checkpoint. Prefers a `latest` symlink containing only `target`'s
/// basename; falls back to a `latest.json` pointer file when the platform
/// or filesystem rejects symlink creation.
pub fn update_latest_pointer(root: &Path, target: &Path) -> std::io::Result<()> {
    let basename = target
        .file_name()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "target has no basename"))?;
    match update_latest_symlink(root, basename.as_ref()) {
        Ok(()) => Ok(()),
        Err(_) => update_latest_json(root, target),
    }
}

#[cfg(unix)]
fn update_latest_symlink(root: &Path, basename: &Path) -> std::io::Result<()> {
    let tmp = root.join(tmp_name("latest"));
    std::os::unix::fs::symlink(basename, &tmp)?;
    let final_path = root.join("latest");
    fs::rename(&tmp, &final_path)?;
    fsync_dir(root)
}

#[cfg(not(unix))]
fn update_latest_symlink(_root: &Path, _basename: &Path) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "symlinks not supported on this platform",
    ))
}

fn update_latest_json(root: &Path, target: &Path) -> std::io::Result<()> {
    let abs = fs::canonicalize(target).unwrap_or_else(|_| target.to_path_buf());
    let body = serde_json::json!({ "latest": abs.to_string_lossy() });
    let rendered = serde_json::to_string(&body).expect("serializing a small static json object");
    let tmp = root.join(tmp_name("latest.json"));
    {
        let mut f = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp)?;
        f.write_all(rendered.as_bytes())?;
        f.sync_all()?;
    }
    let final_path = root.join("latest.json");
    fs::rename(&tmp, &final_path)?;
    fsync_dir(root)
}

/// Resolves the current `latest` pointer under `root`, if any. A pointer
/// whose target no longer exists is treated the same as a missing pointer,
/// never as an error.
pub fn resolve_latest_pointer(root: &Path) -> Option<PathBuf> {
    let link = root.join("latest");
    if let Ok(meta) = fs::symlink_metadata(&link) {
        if meta.file_type().is_symlink() {
            if let Ok(target) = fs::read_link(&link) {
                let resolved = if target.is_absolute() {
                    target
                } else {
                    root.join(target)
                };
                if resolved.exists() {
                    return Some(resolved);
                }
                return None;
            }
        }
    }
    let json_path = root.join("latest.json");
    if let Ok(bytes) = fs::read(&json_path) {
        if let Ok(value) = serde_json::from_slice::<serde_json::Value>(&bytes) {
            if let Some(latest) = value.get("latest").and_then(|v| v.as_str()) {
                let path = PathBuf::from(latest);
                if path.exists() {
                    return Some(path);
                }
            }
        }
    }
    None
}

/// Recursively removes a checkpoint directory if it still exists. A
/// already-missing target is not an error.
pub fn safe_remove_checkpoint(checkpoint: &Path) -> std::io::Result<()> {
    if checkpoint.exists() {
        fs::remove_dir_all(checkpoint)?;
    }
    Ok(())
}
