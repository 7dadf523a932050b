//! YAML-backed configuration with deep-merged programmatic overrides.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HashingConfig {
    #[serde(default = "default_sample_bytes")]
    pub sample_bytes: Option<u64>,
    #[serde(default = "default_threads")]
    pub threads: usize,
    #[serde(default)]
    pub full: bool,
}

fn default_sample_bytes() -> Option<u64> {
    Some(65536)
}
fn default_threads() -> usize {
    4
}

impl Default for HashingConfig {
    fn default() -> Self {
        HashingConfig {
            sample_bytes: default_sample_bytes(),
            threads: default_threads(),
            full: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetentionConfig {
    #[serde(default = "default_keep_last")]
    pub keep_last: usize,
    #[serde(default)]
    pub keep_every: Option<u64>,
}

fn default_keep_last() -> usize {
    3
}

impl Default for RetentionConfig {
    fn default() -> Self {
        RetentionConfig {
            keep_last: default_keep_last(),
            keep_every: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    #[serde(default)]
    pub textfile: Option<std::path::PathBuf>,
    #[serde(default)]
    pub pushgateway: Option<String>,
    #[serde(default = "default_pushgateway_job")]
    pub pushgateway_job: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

fn default_pushgateway_job() -> String {
    "ckptkit".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub root: std::path::PathBuf,
    #[serde(default)]
    pub hashing: HashingConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default = "default_unknown")]
    pub job_id: String,
    #[serde(default = "default_unknown")]
    pub run_id: String,
}

fn default_unknown() -> String {
    "unknown".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            root: std::path::PathBuf::new(),
            hashing: HashingConfig::default(),
            retention: RetentionConfig::default(),
            metrics: MetricsConfig::default(),
            job_id: default_unknown(),
            run_id: default_unknown(),
        }
    }
}

impl Config {
    /// Loads configuration from an optional YAML file, then deep-merges
    /// `overrides` over it: a nested-map override only replaces the keys
    /// it names, leaving untouched sibling keys from the base document in
    /// place; a scalar override replaces wholesale.
    pub fn load(path: Option<&Path>, overrides: &Value) -> Result<Config, ConfigError> {
        let base: Value = match path {
            Some(p) => {
                let text = std::fs::read_to_string(p)?;
                serde_yaml::from_str(&text)?
            }
            None => Value::Mapping(Default::default()),
        };
        let merged = merge(base, overrides.clone());
        let config: Config = serde_yaml::from_value(merged)?;
        Ok(config)
    }
}

fn merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Mapping(mut base_map), Value::Mapping(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged_value = match base_map.remove(&key) {
                    Some(base_value) => merge(base_value, overlay_value),
                    None => overlay_value,
                };
                base_map.insert(key, merged_value);
            }
            Value::Mapping(base_map)
        }
        (_, overlay) => overlay,
    }
}
