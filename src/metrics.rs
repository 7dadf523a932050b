//! Prometheus-compatible metric accumulation and exposition.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use crate::error::MetricsError;
use crate::resume::ResumePlan;
use crate::validate::ValidationResult;

const DURATION_BUCKETS: &[f64] = &[
    0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1200.0, 3600.0,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Gauge,
    Counter,
}

#[derive(Debug, Clone)]
pub struct MetricSample {
    pub name: String,
    pub value: f64,
    pub labels: BTreeMap<String, String>,
    pub metric_type: MetricType,
}

impl MetricSample {
    fn render(&self) -> String {
        if self.labels.is_empty() {
            format!("{} {}", self.name, render_value(self.value))
        } else {
            let label_body = self
                .labels
                .iter()
                .map(|(k, v)| format!("{k}=\"{}\"", escape_label_value(v)))
                .collect::<Vec<_>>()
                .join(",");
            format!("{}{{{label_body}}} {}", self.name, render_value(self.value))
        }
    }
}

fn render_value(v: f64) -> String {
    if v.fract() == 0.0 && v.is_finite() {
        format!("{v:.0}")
    } else {
        v.to_string()
    }
}

fn escape_label_value(v: &str) -> String {
    v.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Accumulates gauge and counter observations keyed by `(name, labels)`
/// and renders them in Prometheus text exposition format.
#[derive(Debug, Default)]
pub struct MetricsEmitter {
    base_labels: BTreeMap<String, String>,
    samples: Mutex<BTreeMap<(String, Vec<(String, String)>), MetricSample>>,
}

impl MetricsEmitter {
    pub fn new(base_labels: BTreeMap<String, String>) -> Self {
        MetricsEmitter {
            base_labels,
            samples: Mutex::new(BTreeMap::new()),
        }
    }

    fn key(name: &str, labels: &BTreeMap<String, String>) -> (String, Vec<(String, String)>) {
        (name.to_string(), labels.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    fn merged_labels(&self, labels: &[(&str, &str)]) -> BTreeMap<String, String> {
        let mut merged = self.base_labels.clone();
        for (k, v) in labels {
            merged.insert(k.to_string(), v.to_string());
        }
        merged
    }

    pub fn gauge(&self, name: &str, value: f64, labels: &[(&str, &str)]) {
        let merged = self.merged_labels(labels);
        let key = Self::key(name, &merged);
        self.samples.lock().expect("metrics mutex not poisoned").insert(
            key,
            MetricSample {
                name: name.to_string(),
                value,
                labels: merged,
                metric_type: MetricType::Gauge,
            },
        );
    }

    pub fn counter(&self, name: &str, delta: f64, labels: &[(&str, &str)]) {
        let merged = self.merged_labels(labels);
        let key = Self::key(name, &merged);
        let mut samples = self.samples.lock().expect("metrics mutex not poisoned");
        samples
            .entry(key)
            .and_modify(|s| s.value += delta)
            .or_insert(MetricSample {
                name: name.to_string(),
                value: delta,
                labels: merged,
                metric_type: MetricType::Counter,
            });
    }

    /// Renders every accumulated sample in Prometheus text exposition
    /// format, sorted by `(name, labels)` so output is independent of the
    /// order calls were made in.
    pub fn text(&self) -> String {
        let samples = self.samples.lock().expect("metrics mutex not poisoned");
        let mut rendered: Vec<&MetricSample> = samples.values().collect();
        rendered.sort_by(|a, b| (&a.name, &a.labels).cmp(&(&b.name, &b.labels)));
        let mut out = String::new();
        for sample in rendered {
            out.push_str(&sample.render());
            out.push('\n');
        }
        out
    }

    /// Writes the rendered text to `path` via a temp-file-plus-fsync-plus-
    /// rename so a scraper never observes a partially written file.
    pub fn write_textfile(&self, path: &Path) -> Result<(), MetricsError> {
        let rendered = self.text();
        let parent = path.parent().unwrap_or(Path::new("."));
        let tmp_name = format!(
            ".{}.tmp",
            path.file_name().and_then(|s| s.to_str()).unwrap_or("metrics.prom")
        );
        let tmp_path = parent.join(tmp_name);
        {
            let mut f = OpenOptions::new().create(true).write(true).truncate(true).open(&tmp_path)?;
            f.write_all(rendered.as_bytes())?;
            f.sync_all()?;
        }
        std::fs::rename(&tmp_path, path)?;
        crate::fs::fsync_dir(parent)?;
        Ok(())
    }

    /// PUTs the rendered text to `<url>/metrics/job/<job>`, the Pushgateway
    /// convention.
    pub fn push_gateway(&self, url: &str, job: &str) -> Result<(), MetricsError> {
        let target = format!("{}/metrics/job/{}", url.trim_end_matches('/'), job);
        ureq::put(&target)
            .set("Content-Type", "text/plain; version=0.0.4")
            .timeout(std::time::Duration::from_secs(5))
            .send_string(&self.text())
            .map_err(|e| MetricsError::Push(e.to_string()))?;
        Ok(())
    }
}

/// Records a counter per failure reason plus an `all` aggregate across a
/// batch of validation results. `all` counts invalid checkpoints, not
/// issues — a checkpoint with three issues still contributes `1` to
/// `all`, the same as a checkpoint with one.
pub fn record_validation_metrics(emitter: &MetricsEmitter, results: &[ValidationResult]) {
    let mut total_failures = 0u64;
    for result in results {
        if result.valid {
            continue;
        }
        total_failures += 1;
        for issue in &result.issues {
            emitter.counter(
                "checkpoint_validation_failures_total",
                1.0,
                &[("reason", issue.reason.as_str())],
            );
        }
    }
    emitter.counter("checkpoint_validation_failures_total", total_failures as f64, &[("reason", "all")]);
}

/// Records the selected resume step and whether corruption was detected
/// for the chosen checkpoint.
pub fn record_resume_plan(emitter: &MetricsEmitter, plan: &ResumePlan) {
    emitter.gauge("checkpoint_resume_selected_step", plan.step as f64, &[]);
    let name = plan
        .checkpoint
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    emitter.gauge(
        "checkpoint_corrupt_detected",
        if plan.validation.valid { 0.0 } else { 1.0 },
        &[("checkpoint", name.as_str())],
    );
}

/// Records write success gauges, a running byte counter, and a manual
/// duration histogram using the fixed bucket boundaries.
pub fn record_checkpoint_write(
    emitter: &MetricsEmitter,
    step: u64,
    duration_seconds: f64,
    total_bytes: u64,
    now: f64,
) {
    emitter.gauge("checkpoint_last_success_step", step as f64, &[]);
    emitter.gauge("checkpoint_last_success_timestamp", now, &[]);
    emitter.gauge("checkpoint_last_duration_seconds", duration_seconds, &[]);
    emitter.counter("checkpoint_write_bytes_total", total_bytes as f64, &[]);

    for &bucket in DURATION_BUCKETS {
        if duration_seconds <= bucket {
            emitter.counter(
                "checkpoint_last_duration_seconds_bucket",
                1.0,
                &[("le", &bucket.to_string())],
            );
        }
    }
    emitter.counter("checkpoint_last_duration_seconds_bucket", 1.0, &[("le", "+Inf")]);
    emitter.counter("checkpoint_last_duration_seconds_count", 1.0, &[]);
    emitter.counter("checkpoint_last_duration_seconds_sum", duration_seconds, &[]);
}

/// Records free disk space at `path` under the checkpoint root.
pub fn record_disk_free(emitter: &MetricsEmitter, path: &Path) -> std::io::Result<()> {
    let free = crate::fs::disk_free_bytes(path)?;
    emitter.gauge("checkpoint_directory_free_bytes", free as f64, &[]);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_output_is_stable_under_call_reordering() {
        let emitter_a = MetricsEmitter::default();
        emitter_a.gauge("a", 1.0, &[]);
        emitter_a.gauge("b", 2.0, &[]);

        let emitter_b = MetricsEmitter::default();
        emitter_b.gauge("b", 2.0, &[]);
        emitter_b.gauge("a", 1.0, &[]);

        assert_eq!(emitter_a.text(), emitter_b.text());
    }

    #[test]
    fn counter_accumulates() {
        let emitter = MetricsEmitter::default();
        emitter.counter("hits", 1.0, &[]);
        emitter.counter("hits", 2.0, &[]);
        assert!(emitter.text().contains("hits 3"));
    }

    #[test]
    fn textfile_write_is_atomic_and_readable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.prom");
        let emitter = MetricsEmitter::default();
        emitter.gauge("x", 5.0, &[]);
        emitter.write_textfile(&path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("x 5"));
    }
}
