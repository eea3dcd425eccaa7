// ABOUTME: HTTP health check configuration for backend releases.
// ABOUTME: Defines the health path, per-attempt timeout, retry count, and interval.

use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct HealthcheckConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default = "default_path")]
    pub path: String,

    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    #[serde(default = "default_retries")]
    pub retries: u32,

    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,
}

impl Default for HealthcheckConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            path: default_path(),
            timeout: default_timeout(),
            retries: default_retries(),
            interval: default_interval(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_path() -> String {
    "/health".to_string()
}

fn default_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_retries() -> u32 {
    10
}

fn default_interval() -> Duration {
    Duration::from_secs(3)
}
