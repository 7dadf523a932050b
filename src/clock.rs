//! Injectable time and hostname providers.
//!
//! The manifest builder needs "now" and "this host's name" but must not
//! reach into process globals directly, so both are modeled as small
//! traits with a default, OS-backed implementation. Tests inject fixed
//! values to keep manifests deterministic.

use std::time::{SystemTime, UNIX_EPOCH};

pub trait Clock: Send + Sync {
    fn now_unix_seconds(&self) -> f64;
}

pub trait HostnameProvider: Send + Sync {
    fn hostname(&self) -> String;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix_seconds(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct OsHostname;

impl HostnameProvider for OsHostname {
    fn hostname(&self) -> String {
        hostname::get()
            .ok()
            .and_then(|s| s.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string())
    }
}
