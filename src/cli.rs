//! Clap argument definitions for the `ckptctl` binary. Dispatch logic lives
//! in `src/bin/ckptctl.rs`; this module only describes the surface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "ckptctl", about = "Checkpoint integrity and recovery toolkit")]
pub struct Cli {
    /// Optional YAML configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug-level logging.
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Write a demo checkpoint (model.bin/optimizer.bin/meta.json) and commit it.
    Write {
        #[arg(long)]
        root: PathBuf,
        #[arg(long)]
        job_id: String,
        #[arg(long)]
        run_id: String,
        #[arg(long)]
        step: u64,
        #[arg(long, default_value_t = 1)]
        world_size: u64,
        #[arg(long)]
        framework: Option<String>,
        #[arg(long)]
        precision: Option<String>,
        #[arg(long)]
        model_name: Option<String>,
        #[arg(long, default_value_t = 3)]
        keep_last: usize,
        #[arg(long)]
        keep_every: Option<u64>,
    },
    /// Validate a single checkpoint directory.
    Validate {
        path: PathBuf,
        #[arg(long)]
        full: bool,
        #[arg(long)]
        sample_bytes: Option<u64>,
    },
    /// Validate every checkpoint under a root.
    Scan {
        root: PathBuf,
        #[arg(long)]
        full: bool,
        #[arg(long)]
        sample_bytes: Option<u64>,
    },
    /// Select a checkpoint to resume from.
    Resume {
        root: PathBuf,
        #[arg(long, default_value = "latest-valid")]
        policy: String,
        #[arg(long)]
        before_step: Option<i64>,
        #[arg(long)]
        full: bool,
    },
    /// Move a checkpoint aside into `<root>/corrupt/`.
    Quarantine {
        path: PathBuf,
        #[arg(long)]
        reason: String,
    },
    /// Emit metrics for the current state of a checkpoint root.
    EmitMetrics {
        #[arg(long)]
        root: PathBuf,
        #[arg(long)]
        textfile: Option<PathBuf>,
        #[arg(long)]
        pushgateway: Option<String>,
        #[arg(long, default_value = "ckptkit")]
        job: String,
    },
}
