//! SHA-256 content hashing, full or sampled, parallelized across a bounded
//! worker pool.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crossbeam::channel;
use sha2::{Digest, Sha256};

use crate::error::HashingError;

const CHUNK_SIZE: usize = 1 << 20;

/// Hashes `path` with SHA-256, returning a lowercase hex digest.
///
/// When `sample_bytes` is `None`/zero, or the file is small enough that
/// `2 * sample_bytes >= size`, the whole file is hashed in 1 MiB chunks.
/// Otherwise the digest covers only the first and last `sample_bytes`
/// bytes plus the decimal size, making truncation and extension visible
/// without re-reading the bulk of a large file on every validation.
pub fn compute_sha256(path: &Path, sample_bytes: Option<u64>) -> Result<String, HashingError> {
    let io_err = |source: std::io::Error| HashingError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::open(path).map_err(io_err)?;
    let size = file.metadata().map_err(io_err)?.len();

    let sample = sample_bytes.filter(|&s| s > 0);
    let full_mode = match sample {
        None => true,
        Some(s) => s.saturating_mul(2) >= size,
    };

    let mut hasher = Sha256::new();
    if full_mode {
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let n = file.read(&mut buf).map_err(io_err)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
    } else {
        let sample = sample.expect("sampled mode implies Some");
        let mut head = vec![0u8; sample as usize];
        let read_head = read_fully(&mut file, &mut head).map_err(io_err)?;
        hasher.update(&head[..read_head]);

        let tail_start = size.saturating_sub(sample).max(sample);
        file.seek(SeekFrom::Start(tail_start)).map_err(io_err)?;
        let mut tail = vec![0u8; sample as usize];
        let read_tail = read_fully(&mut file, &mut tail).map_err(io_err)?;
        hasher.update(&tail[..read_tail]);

        hasher.update(size.to_string().as_bytes());
    }

    Ok(format!("{:x}", hasher.finalize()))
}

fn read_fully(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        let n = file.read(&mut buf[total..])?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}

/// Hashes every path in `paths` across a bounded worker pool, returning a
/// map from path to digest. The batch aborts on the first I/O error,
/// reporting which path failed.
pub fn hash_paths(
    paths: &[PathBuf],
    sample_bytes: Option<u64>,
    threads: usize,
) -> Result<HashMap<PathBuf, String>, HashingError> {
    let workers = threads.max(1).min(paths.len().max(1));
    if paths.is_empty() {
        return Ok(HashMap::new());
    }

    let (work_tx, work_rx) = channel::unbounded::<PathBuf>();
    let (result_tx, result_rx) = channel::unbounded::<Result<(PathBuf, String), HashingError>>();

    for path in paths {
        work_tx.send(path.clone()).expect("channel receiver outlives all sends");
    }
    drop(work_tx);

    crossbeam::thread::scope(|scope| {
        for _ in 0..workers {
            let work_rx = work_rx.clone();
            let result_tx = result_tx.clone();
            scope.spawn(move |_| {
                for path in work_rx.iter() {
                    let outcome = compute_sha256(&path, sample_bytes).map(|digest| (path, digest));
                    if result_tx.send(outcome).is_err() {
                        break;
                    }
                }
            });
        }
        drop(result_tx);

        let mut out = HashMap::with_capacity(paths.len());
        for result in result_rx.iter() {
            let (path, digest) = result?;
            out.insert(path, digest);
        }
        Ok(out)
    })
    .expect("worker threads never panic")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn full_hash_matches_manual_sha256() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.bin");
        std::fs::write(&path, b"hello world").unwrap();

        let digest = compute_sha256(&path, None).unwrap();
        let mut hasher = Sha256::new();
        hasher.update(b"hello world");
        assert_eq!(digest, format!("{:x}", hasher.finalize()));
    }

    #[test]
    fn sampled_hash_is_size_sensitive() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.bin");
        std::fs::write(&path, vec![0u8; 128]).unwrap();
        let short = compute_sha256(&path, Some(8)).unwrap();

        std::fs::write(&path, vec![0u8; 129]).unwrap();
        let longer = compute_sha256(&path, Some(8)).unwrap();

        assert_ne!(short, longer);
    }

    #[test]
    fn small_file_uses_full_mode_even_with_sampling_requested() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.bin");
        std::fs::write(&path, b"tiny").unwrap();

        let sampled = compute_sha256(&path, Some(65536)).unwrap();
        let full = compute_sha256(&path, None).unwrap();
        assert_eq!(sampled, full);
    }

    #[test]
    fn hash_paths_hashes_every_file() {
        let dir = tempdir().unwrap();
        let mut paths = Vec::new();
        for i in 0..5 {
            let p = dir.path().join(format!("f{i}.bin"));
            std::fs::write(&p, format!("content-{i}")).unwrap();
            paths.push(p);
        }
        let digests = hash_paths(&paths, None, 4).unwrap();
        assert_eq!(digests.len(), 5);
        for p in &paths {
            assert!(digests.contains_key(p));
        }
    }

    #[test]
    fn hash_paths_reports_missing_file() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope.bin");
        let err = hash_paths(&[missing], None, 2).unwrap_err();
        match err {
            HashingError::Io { path, .. } => assert_eq!(path, dir.path().join("nope.bin")),
        }
    }
}
