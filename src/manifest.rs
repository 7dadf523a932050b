//! The self-describing, content-hashed manifest that anchors every
//! checkpoint.
//!
//! Unlike the teacher's WAL-backed manifest, a checkpoint manifest here is
//! a single flat JSON document: one checkpoint, one manifest, written once
//! at commit time. The durability pattern — write to a temp file in the
//! same directory, fsync, rename, fsync the parent — is the same one used
//! for the WAL-backed snapshot, just without a WAL to truncate afterward.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clock::{Clock, HostnameProvider};
use crate::error::ManifestError;
use crate::fs::fsync_dir;
use crate::hashing;

pub const MANIFEST_NAME: &str = "manifest.json";
pub const MANIFEST_VERSION: &str = "1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub size: u64,
    pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: String,
    pub created_at: f64,
    pub job_id: String,
    pub run_id: String,
    pub step: u64,
    pub host: String,
    pub world_size: u64,
    pub files: Vec<FileEntry>,
    #[serde(default)]
    pub framework: Option<String>,
    #[serde(default)]
    pub precision: Option<String>,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub extra: BTreeMap<String, Value>,
}

/// Returns the manifest path for a checkpoint directory.
pub fn manifest_path(checkpoint_dir: &Path) -> PathBuf {
    checkpoint_dir.join(MANIFEST_NAME)
}

/// Writes `manifest` to `path` atomically: serialize with sorted keys and
/// two-space indentation, fsync, then rename over the final path.
pub fn write_manifest(path: &Path, manifest: &Manifest) -> Result<(), ManifestError> {
    let mut rendered = serde_json::to_string_pretty(&SortedManifest(manifest))?;
    rendered.push('\n');

    let parent = path.parent().unwrap_or(Path::new("."));
    let tmp_name = format!(
        ".{}.tmp",
        path.file_name().and_then(|s| s.to_str()).unwrap_or(MANIFEST_NAME)
    );
    let tmp_path = parent.join(tmp_name);
    {
        let mut f = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;
        f.write_all(rendered.as_bytes())?;
        f.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    fsync_dir(parent)?;
    Ok(())
}

/// `serde_json::to_string_pretty` already sorts struct fields in
/// declaration order, not alphabetically; this wrapper re-serializes
/// through a `BTreeMap` so the wire format matches the sorted-keys
/// contract exactly, independent of field declaration order.
struct SortedManifest<'a>(&'a Manifest);

impl Serialize for SortedManifest<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let value = serde_json::to_value(self.0).map_err(serde::ser::Error::custom)?;
        let sorted: BTreeMap<String, Value> = match value {
            Value::Object(map) => map.into_iter().collect(),
            other => return other.serialize(serializer),
        };
        sorted.serialize(serializer)
    }
}

/// Reads and schema-validates a manifest from `path`.
pub fn read_manifest(path: &Path) -> Result<Manifest, ManifestError> {
    let bytes = fs::read(path)?;
    let value: Value = serde_json::from_slice(&bytes)?;
    validate_schema(&value)?;
    let manifest: Manifest = serde_json::from_value(value)?;
    Ok(manifest)
}

fn validate_schema(value: &Value) -> Result<(), ManifestError> {
    let obj = value
        .as_object()
        .ok_or_else(|| ManifestError::SchemaInvalid("root is not an object".to_string()))?;

    for field in [
        "version",
        "created_at",
        "job_id",
        "run_id",
        "step",
        "host",
        "world_size",
        "files",
    ] {
        if !obj.contains_key(field) {
            return Err(ManifestError::SchemaInvalid(format!("missing field `{field}`")));
        }
    }

    let files = obj
        .get("files")
        .and_then(Value::as_array)
        .ok_or_else(|| ManifestError::SchemaInvalid("`files` is not a list".to_string()))?;

    for (i, entry) in files.iter().enumerate() {
        let entry_obj = entry
            .as_object()
            .ok_or_else(|| ManifestError::SchemaInvalid(format!("files[{i}] is not an object")))?;
        for field in ["path", "size", "sha256"] {
            if !entry_obj.contains_key(field) {
                return Err(ManifestError::SchemaInvalid(format!(
                    "files[{i}] missing field `{field}`"
                )));
            }
        }
    }

    Ok(())
}

/// Parameters for building a manifest from a directory's current contents.
pub struct ComputeManifestArgs<'a> {
    pub job_id: &'a str,
    pub run_id: &'a str,
    pub step: u64,
    pub world_size: u64,
    pub framework: Option<&'a str>,
    pub precision: Option<&'a str>,
    pub model_name: Option<&'a str>,
    pub sample_bytes: Option<u64>,
    pub threads: usize,
    pub ignore_names: &'a [&'a str],
}

/// Walks `dir`, hashing every regular file except `manifest.json` and any
/// caller-specified ignore names, and returns a manifest with `files`
/// sorted by relative path.
pub fn compute_manifest(
    dir: &Path,
    args: ComputeManifestArgs<'_>,
    clock: &dyn Clock,
    hostname: &dyn HostnameProvider,
) -> Result<Manifest, ManifestError> {
    let mut paths = Vec::new();
    collect_files(dir, dir, args.ignore_names, &mut paths)?;

    let digests = hashing::hash_paths(&paths, args.sample_bytes, args.threads)
        .map_err(|e| ManifestError::SchemaInvalid(e.to_string()))?;

    let mut files = Vec::with_capacity(paths.len());
    for path in &paths {
        let rel = path
            .strip_prefix(dir)
            .expect("collect_files only yields descendants of dir")
            .to_string_lossy()
            .replace('\\', "/");
        let size = fs::metadata(path)?.len();
        let sha256 = digests.get(path).cloned().unwrap_or_default();
        files.push(FileEntry { path: rel, size, sha256 });
    }
    files.sort_by(|a, b| a.path.cmp(&b.path));

    Ok(Manifest {
        version: MANIFEST_VERSION.to_string(),
        created_at: clock.now_unix_seconds(),
        job_id: args.job_id.to_string(),
        run_id: args.run_id.to_string(),
        step: args.step,
        host: hostname.hostname(),
        world_size: args.world_size,
        files,
        framework: args.framework.map(str::to_string),
        precision: args.precision.map(str::to_string),
        model_name: args.model_name.map(str::to_string),
        extra: BTreeMap::new(),
    })
}

fn collect_files(
    root: &Path,
    dir: &Path,
    ignore_names: &[&str],
    out: &mut Vec<PathBuf>,
) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name == MANIFEST_NAME || ignore_names.contains(&name.as_ref()) {
            continue;
        }
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect_files(root, &path, ignore_names, out)?;
        } else if file_type.is_file() {
            out.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::fixed::{FixedClock, FixedHostname};
    use tempfile::tempdir;

    #[test]
    fn roundtrip_preserves_fields_and_file_order() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("b.bin"), b"bb").unwrap();
        fs::write(dir.path().join("a.bin"), b"a").unwrap();

        let clock = FixedClock(1700000000.0);
        let hostname = FixedHostname("trainer-0");
        let manifest = compute_manifest(
            dir.path(),
            ComputeManifestArgs {
                job_id: "job",
                run_id: "run",
                step: 7,
                world_size: 1,
                framework: Some("pytorch"),
                precision: None,
                model_name: None,
                sample_bytes: None,
                threads: 2,
                ignore_names: &[],
            },
            &clock,
            &hostname,
        )
        .unwrap();

        assert_eq!(manifest.files.len(), 2);
        assert_eq!(manifest.files[0].path, "a.bin");
        assert_eq!(manifest.files[1].path, "b.bin");

        let path = manifest_path(dir.path());
        write_manifest(&path, &manifest).unwrap();
        let loaded = read_manifest(&path).unwrap();

        assert_eq!(loaded, manifest);
        assert_eq!(loaded.step, 7);
        assert_eq!(loaded.job_id, "job");
    }

    #[test]
    fn schema_validation_rejects_missing_field() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(MANIFEST_NAME);
        fs::write(&path, r#"{"version":"1"}"#).unwrap();
        let err = read_manifest(&path).unwrap_err();
        assert!(matches!(err, ManifestError::SchemaInvalid(_)));
    }

    #[test]
    fn manifest_file_not_included_in_its_own_listing() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("x.bin"), b"x").unwrap();
        fs::write(dir.path().join(MANIFEST_NAME), b"stale").unwrap();

        let clock = FixedClock(0.0);
        let hostname = FixedHostname("h");
        let manifest = compute_manifest(
            dir.path(),
            ComputeManifestArgs {
                job_id: "j",
                run_id: "r",
                step: 0,
                world_size: 1,
                framework: None,
                precision: None,
                model_name: None,
                sample_bytes: None,
                threads: 1,
                ignore_names: &[],
            },
            &clock,
            &hostname,
        )
        .unwrap();

        assert_eq!(manifest.files.len(), 1);
        assert_eq!(manifest.files[0].path, "x.bin");
    }
}
