//! Crate-wide error aggregation.
//!
//! Each component owns a narrow `thiserror` enum describing the ways it can
//! fail; [`CkptError`] aggregates them at the boundary the CLI and other
//! callers actually see, the same way a storage engine aggregates its
//! sub-module errors into one top-level type.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode/decode manifest JSON: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("manifest schema invalid: missing or malformed field `{0}`")]
    SchemaInvalid(String),
}

#[derive(Debug, Error)]
pub enum HashingError {
    #[error("I/O error hashing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum CommitError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error(transparent)]
    Hashing(#[from] HashingError),
    #[error("writer callback failed: {0}")]
    Writer(String),
}

#[derive(Debug, Error)]
pub enum ValidateError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ResumeError {
    #[error("no checkpoints available under {0}")]
    NoCheckpoints(PathBuf),
    #[error("policy `newest-before` requires a before_step value")]
    MissingBeforeStep,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum QuarantineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("pushgateway request failed: {0}")]
    Push(String),
}

#[derive(Debug, Error)]
pub enum IntegrationError {
    #[error("no checkpoint file found under {0}")]
    NotFound(PathBuf),
}

/// Top-level error type aggregating every component's error enum.
///
/// This is the type the CLI binary matches on to decide exit codes; library
/// callers that only use one component can match the narrower enum directly
/// since every variant here is a thin `#[from]` wrapper.
#[derive(Debug, Error)]
pub enum CkptError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error(transparent)]
    Hashing(#[from] HashingError),
    #[error(transparent)]
    Commit(#[from] CommitError),
    #[error(transparent)]
    Validate(#[from] ValidateError),
    #[error(transparent)]
    Resume(#[from] ResumeError),
    #[error(transparent)]
    Quarantine(#[from] QuarantineError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Metrics(#[from] MetricsError),
    #[error(transparent)]
    Integration(#[from] IntegrationError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
