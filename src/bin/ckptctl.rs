//! `ckptctl` command-line entry point. Parses arguments, builds a
//! `Config`, and dispatches to the library's commit/validate/resume/
//! quarantine/metrics operations. Exit code `0` on success, `1` on a
//! validation or policy failure, non-zero on unexpected errors.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ckptctl::cli::{Cli, Command};
use ckptctl::clock::{OsHostname, SystemClock};
use ckptctl::commit::commit;
use ckptctl::config::{Config, RetentionConfig};
use ckptctl::logging::{FieldValue, LogSink, Severity, TracingSink};
use ckptctl::manifest::{compute_manifest, manifest_path, write_manifest, ComputeManifestArgs};
use ckptctl::metrics::{record_checkpoint_write, record_disk_free, record_resume_plan, record_validation_metrics, MetricsEmitter};
use ckptctl::quarantine::quarantine;
use ckptctl::resume::{select, Policy};
use ckptctl::validate::validate;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let overrides = serde_yaml::Value::Mapping(Default::default());
    let config = Config::load(cli.config.as_deref(), &overrides).unwrap_or_default();

    let log = TracingSink;
    let exit_ok = dispatch(cli.command, &config, &log)?;
    if !exit_ok {
        std::process::exit(1);
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .try_init();
}

fn dispatch(command: Command, config: &Config, log: &dyn LogSink) -> Result<bool> {
    match command {
        Command::Write {
            root,
            job_id,
            run_id,
            step,
            world_size,
            framework,
            precision,
            model_name,
            keep_last,
            keep_every,
        } => cmd_write(
            &root, &job_id, &run_id, step, world_size, framework, precision, model_name, keep_last, keep_every, config, log,
        ),
        Command::Validate { path, full, sample_bytes } => cmd_validate(&path, full, sample_bytes),
        Command::Scan { root, full, sample_bytes } => cmd_scan(&root, full, sample_bytes),
        Command::Resume { root, policy, before_step, full } => cmd_resume(&root, &policy, before_step, full, config, log),
        Command::Quarantine { path, reason } => cmd_quarantine(&path, &reason),
        Command::EmitMetrics { root, textfile, pushgateway, job } => {
            cmd_emit_metrics(&root, textfile.or(config.metrics.textfile.clone()), pushgateway.or(config.metrics.pushgateway.clone()), &job)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_write(
    root: &std::path::Path,
    job_id: &str,
    run_id: &str,
    step: u64,
    world_size: u64,
    framework: Option<String>,
    precision: Option<String>,
    model_name: Option<String>,
    keep_last: usize,
    keep_every: Option<u64>,
    config: &Config,
    log: &dyn LogSink,
) -> Result<bool> {
    let dest = root.join(format!("step-{step}"));
    let job_id_owned = job_id.to_string();
    let run_id_owned = run_id.to_string();

    let outcome = commit(
        &dest,
        move |staging| -> Result<_, std::io::Error> {
            std::fs::write(staging.join("model.bin"), b"demo-model-weights")?;
            std::fs::write(staging.join("optimizer.bin"), b"demo-optimizer-state")?;
            std::fs::write(staging.join("meta.json"), format!("{{\"step\":{step}}}"))?;

            let manifest = compute_manifest(
                staging,
                ComputeManifestArgs {
                    job_id: &job_id_owned,
                    run_id: &run_id_owned,
                    step,
                    world_size,
                    framework: framework.as_deref(),
                    precision: precision.as_deref(),
                    model_name: model_name.as_deref(),
                    sample_bytes: None,
                    threads: 4,
                    ignore_names: &[],
                },
                &SystemClock,
                &OsHostname,
            )
            .map_err(|e| std::io::Error::other(e.to_string()))?;
            write_manifest(&manifest_path(staging), &manifest).map_err(|e| std::io::Error::other(e.to_string()))?;
            Ok(manifest)
        },
        true,
        Some(&RetentionConfig { keep_last, keep_every }),
        log,
    )
    .context("commit failed")?;

    log.event(
        "checkpoint_written",
        Severity::Info,
        &[("event", FieldValue::from("checkpoint_written")), ("step", FieldValue::from(outcome.manifest.step))],
    );
    println!("wrote checkpoint at step {}", outcome.manifest.step);

    emit_write_metrics(config, &outcome, root)?;
    Ok(true)
}

fn emit_write_metrics(config: &Config, outcome: &ckptctl::commit::CommitOutcome, root: &std::path::Path) -> Result<()> {
    if config.metrics.textfile.is_none() && config.metrics.pushgateway.is_none() {
        return Ok(());
    }
    let emitter = MetricsEmitter::default();
    record_checkpoint_write(&emitter, outcome.manifest.step, outcome.duration.as_secs_f64(), outcome.total_bytes, outcome.manifest.created_at);
    record_disk_free(&emitter, root)?;
    if let Some(path) = &config.metrics.textfile {
        emitter.write_textfile(path)?;
    }
    if let Some(url) = &config.metrics.pushgateway {
        emitter.push_gateway(url, &config.metrics.pushgateway_job)?;
    }
    Ok(())
}

fn cmd_validate(path: &std::path::Path, full: bool, sample_bytes: Option<u64>) -> Result<bool> {
    let result = validate(path, full, sample_bytes.or(Some(65536))).context("validation failed")?;
    println!("{}", result.summary());
    Ok(result.valid)
}

fn cmd_scan(root: &std::path::Path, full: bool, sample_bytes: Option<u64>) -> Result<bool> {
    let checkpoints = ckptctl::fs::list_checkpoints(root).context("listing checkpoints failed")?;
    let mut all_valid = true;
    for checkpoint in checkpoints {
        let result = validate(&checkpoint, full, sample_bytes.or(Some(65536)))?;
        println!("{}", result.summary());
        all_valid &= result.valid;
    }
    Ok(all_valid)
}

fn cmd_resume(root: &std::path::Path, policy: &str, before_step: Option<i64>, full: bool, config: &Config, log: &dyn LogSink) -> Result<bool> {
    let policy = match policy {
        "latest-valid" => Policy::LatestValid,
        "last-known-good" => Policy::LastKnownGood,
        "newest-before" => Policy::NewestBefore,
        "best" => Policy::Best,
        other => bail!("unknown resume policy `{other}`"),
    };

    let plan = select(root, policy, before_step, full, true, log).context("resume selection failed")?;
    println!("resume from {} (step {}): {}", plan.checkpoint.display(), plan.step, plan.reason);

    if config.metrics.textfile.is_some() || config.metrics.pushgateway.is_some() {
        let emitter = MetricsEmitter::default();
        record_resume_plan(&emitter, &plan);
        if let Some(path) = &config.metrics.textfile {
            emitter.write_textfile(path)?;
        }
        if let Some(url) = &config.metrics.pushgateway {
            emitter.push_gateway(url, &config.metrics.pushgateway_job)?;
        }
    }

    Ok(plan.validation.valid)
}

fn cmd_quarantine(path: &std::path::Path, reason: &str) -> Result<bool> {
    let root = path.parent().context("checkpoint path has no parent")?;
    let new_path = quarantine(path, root, reason)?;
    println!("quarantined to {}", new_path.display());
    Ok(true)
}

fn cmd_emit_metrics(root: &std::path::Path, textfile: Option<PathBuf>, pushgateway: Option<String>, job: &str) -> Result<bool> {
    let emitter = MetricsEmitter::default();
    let checkpoints = ckptctl::fs::list_checkpoints(root)?;
    let results: Vec<_> = checkpoints
        .iter()
        .map(|c| validate(c, false, Some(65536)))
        .collect::<Result<_, _>>()?;
    record_validation_metrics(&emitter, &results);
    record_disk_free(&emitter, root)?;

    if let Some(path) = textfile {
        emitter.write_textfile(&path)?;
    }
    if let Some(url) = pushgateway {
        emitter.push_gateway(&url, job)?;
    }
    print!("{}", emitter.text());
    Ok(true)
}
