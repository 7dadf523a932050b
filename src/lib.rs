//! # ckptctl
//!
//! A checkpoint integrity and recovery engine for long-running training
//! jobs: atomic, crash-safe publication of directory-shaped checkpoints, a
//! self-describing content-hashed manifest, a deterministic integrity
//! validator, and a policy-driven resume selector.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                          commit                             │
//! │   stage in temp dir → writer() → fsync tree → rename →      │
//! │   fsync parent → update latest pointer → apply retention    │
//! └───────────────────────────┬──────────────────────────────────┘
//!                             │ produces
//!                             ▼
//! ┌────────────────────────────────────────────────────────────┐
//! │   manifest.json   (version, step, host, files[path,size,sha256]) │
//! └───────────────────────────┬──────────────────────────────────┘
//!                             │ read by
//!              ┌──────────────┴───────────────┐
//!              ▼                               ▼
//! ┌─────────────────────┐          ┌────────────────────────────┐
//! │      validate        │          │          resume            │
//! │  manifest / files /   │◄─────────│  enumerate → validate all  │
//! │  hashes → issues[]    │  uses    │  → apply policy → repair   │
//! └─────────────────────┘          │  latest pointer             │
//!                                   └────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`commit`] | Atomic checkpoint publication and retention |
//! | [`manifest`] | The self-describing, content-hashed checkpoint record |
//! | [`validate`] | Deterministic integrity diagnosis |
//! | [`resume`] | Policy-driven recovery checkpoint selection |
//! | [`quarantine`] | Move-aside of confirmed-bad checkpoints |
//! | [`hashing`] | Full and sampled SHA-256 content hashing |
//! | [`fs`] | Directory fsync, latest-pointer publication, enumeration |
//! | [`config`] | YAML-backed configuration with override merging |
//! | [`metrics`] | Prometheus exposition, textfile and Pushgateway sinks |
//! | [`logging`] | Structured, injectable event logging |
//! | [`clock`] | Injectable time and hostname providers |
//! | [`integrations`] | Framework checkpoint file locators (feature-gated) |
//! | [`error`] | Crate-wide error taxonomy |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ckptctl::commit::commit;
//! use ckptctl::clock::{SystemClock, OsHostname};
//! use ckptctl::manifest::{compute_manifest, write_manifest, manifest_path, ComputeManifestArgs};
//! use ckptctl::logging::TracingSink;
//! use std::path::Path;
//!
//! let outcome = commit(
//!     Path::new("/tmp/checkpoints/step-1"),
//!     |staging| -> Result<_, std::io::Error> {
//!         std::fs::write(staging.join("weights.bin"), b"...")?;
//!         let manifest = compute_manifest(
//!             staging,
//!             ComputeManifestArgs {
//!                 job_id: "job",
//!                 run_id: "run",
//!                 step: 1,
//!                 world_size: 1,
//!                 framework: Some("pytorch"),
//!                 precision: None,
//!                 model_name: None,
//!                 sample_bytes: None,
//!                 threads: 4,
//!                 ignore_names: &[],
//!             },
//!             &SystemClock,
//!             &OsHostname,
//!         ).map_err(|e| std::io::Error::other(e.to_string()))?;
//!         write_manifest(&manifest_path(staging), &manifest)
//!             .map_err(|e| std::io::Error::other(e.to_string()))?;
//!         Ok(manifest)
//!     },
//!     true,
//!     None,
//!     &TracingSink,
//! ).unwrap();
//!
//! assert_eq!(outcome.manifest.step, 1);
//! ```

#![allow(dead_code)]

pub mod cli;
pub mod clock;
pub mod commit;
pub mod config;
pub mod error;
pub mod fs;
pub mod hashing;
pub mod integrations;
pub mod logging;
pub mod manifest;
pub mod metrics;
pub mod quarantine;
pub mod resume;
pub mod validate;
