//! Structured event logging.
//!
//! The CORE never calls `tracing` macros directly for the contractual
//! events it emits (`resume_plan`, `checkpoint_written`, and friends) —
//! it calls an injected [`LogSink`] so tests can assert on exactly what
//! was logged without installing a subscriber. [`TracingSink`] is the
//! production default and forwards to `tracing`'s own macros, so
//! deployments still get the usual subscriber ecosystem for free.

use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone)]
pub enum FieldValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Str(v.to_string())
    }
}
impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Str(v)
    }
}
impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}
impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        FieldValue::Int(v as i64)
    }
}
impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}
impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

pub trait LogSink: Send + Sync {
    fn event(&self, name: &str, severity: Severity, fields: &[(&str, FieldValue)]);
}

/// Forwards to `tracing`'s own macros, with fields rendered as a single
/// `field=value` trailer since `tracing`'s structured-field API requires
/// statically known field names.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn event(&self, name: &str, severity: Severity, fields: &[(&str, FieldValue)]) {
        let rendered = render_fields(fields);
        match severity {
            Severity::Debug => debug!(event = name, "{}", rendered),
            Severity::Info => info!(event = name, "{}", rendered),
            Severity::Warn => warn!(event = name, "{}", rendered),
            Severity::Error => error!(event = name, "{}", rendered),
        }
    }
}

fn render_fields(fields: &[(&str, FieldValue)]) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{k}={}", render_value(v)))
        .collect::<Vec<_>>()
        .join(" ")
}

fn render_value(v: &FieldValue) -> String {
    match v {
        FieldValue::Str(s) => s.clone(),
        FieldValue::Int(i) => i.to_string(),
        FieldValue::Float(f) => f.to_string(),
        FieldValue::Bool(b) => b.to_string(),
    }
}

/// An in-memory sink for tests: records every event it receives.
#[cfg(any(test, feature = "test-util"))]
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub events: std::sync::Mutex<Vec<(String, Severity)>>,
}

#[cfg(any(test, feature = "test-util"))]
impl LogSink for RecordingSink {
    fn event(&self, name: &str, severity: Severity, _fields: &[(&str, FieldValue)]) {
        self.events
            .lock()
            .expect("recording sink mutex not poisoned")
            .push((name.to_string(), severity));
    }
}
