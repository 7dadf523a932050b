//! Micro-benchmarks for the atomic commit and validation hot paths.
//!
//! Uses Criterion for statistically rigorous measurement with regression
//! detection and HTML reports.
//!
//! # Running
//!
//! ```bash
//! cargo bench --bench commit              # run all benchmarks
//! cargo bench --bench commit -- validate  # filter by name
//! ```
//!
//! Reports are generated in `target/criterion/report/index.html`.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use ckptctl::clock::{OsHostname, SystemClock};
use ckptctl::commit::commit;
use ckptctl::manifest::{ComputeManifestArgs, compute_manifest, manifest_path, write_manifest};
use ckptctl::validate::validate;
use tempfile::TempDir;

// ------------------------------------------------------------------------------------------------
// Helpers
// ------------------------------------------------------------------------------------------------

/// Writes `n_files` files of `file_size` bytes each plus a manifest into a
/// fresh checkpoint directory and returns its containing root.
fn write_checkpoint(root: &std::path::Path, step: u64, n_files: usize, file_size: usize) {
    let dest = root.join(format!("step-{step}"));
    let payload = vec![0xABu8; file_size];
    commit(
        &dest,
        move |staging| -> Result<_, std::io::Error> {
            for i in 0..n_files {
                std::fs::write(staging.join(format!("shard-{i:04}.bin")), &payload)?;
            }
            let manifest = compute_manifest(
                staging,
                ComputeManifestArgs {
                    job_id: "bench",
                    run_id: "bench",
                    step,
                    world_size: 1,
                    framework: None,
                    precision: None,
                    model_name: None,
                    sample_bytes: Some(65536),
                    threads: 4,
                    ignore_names: &[],
                },
                &SystemClock,
                &OsHostname,
            )
            .map_err(|e| std::io::Error::other(e.to_string()))?;
            write_manifest(&manifest_path(staging), &manifest)
                .map_err(|e| std::io::Error::other(e.to_string()))?;
            Ok(manifest)
        },
        false,
        None,
        &ckptctl::logging::TracingSink,
    )
    .expect("commit");
}

// ================================================================================================
// commit
// ================================================================================================

fn bench_commit_single_large_file(c: &mut Criterion) {
    let mut group = c.benchmark_group("commit_single_large_file");
    for &size_mb in &[1usize, 16, 64] {
        group.throughput(Throughput::Bytes((size_mb * 1024 * 1024) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size_mb), &size_mb, |b, &size_mb| {
            let mut step = 0u64;
            b.iter(|| {
                let dir = TempDir::new().unwrap();
                write_checkpoint(dir.path(), black_box(step), 1, size_mb * 1024 * 1024);
                step += 1;
            });
        });
    }
    group.finish();
}

fn bench_commit_many_small_files(c: &mut Criterion) {
    let mut group = c.benchmark_group("commit_many_small_files");
    for &n_files in &[16usize, 256] {
        group.bench_with_input(BenchmarkId::from_parameter(n_files), &n_files, |b, &n_files| {
            let mut step = 0u64;
            b.iter(|| {
                let dir = TempDir::new().unwrap();
                write_checkpoint(dir.path(), black_box(step), n_files, 4096);
                step += 1;
            });
        });
    }
    group.finish();
}

// ================================================================================================
// validate
// ================================================================================================

fn bench_validate_sampled_vs_full(c: &mut Criterion) {
    let mut group = c.benchmark_group("validate_sampled_vs_full");
    let dir = TempDir::new().unwrap();
    write_checkpoint(dir.path(), 1, 4, 8 * 1024 * 1024);
    let checkpoint = dir.path().join("step-1");

    group.bench_function("sampled", |b| {
        b.iter(|| black_box(validate(&checkpoint, false, Some(65536)).unwrap()));
    });
    group.bench_function("full", |b| {
        b.iter(|| black_box(validate(&checkpoint, true, None).unwrap()));
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_commit_single_large_file,
    bench_commit_many_small_files,
    bench_validate_sampled_vs_full,
);

criterion_main!(benches);
