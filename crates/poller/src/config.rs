//! Jobs file for the poller.
//!
//! ```yaml
//! jobs:
//!   poller:
//!     enabled: true
//!     type: DURATIONJOB
//!     interval: 10s
//!     external_address: https://example.com/content/articles
//!     retry:
//!       max_attempts: 3
//!       duration: 2s
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sportstream_core::duration::parse_duration;

use crate::error::ConfigError;
use crate::scheduler::Trigger;

/// Default location of the jobs file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/poller.yaml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PollerConfig {
    #[serde(default)]
    pub jobs: BTreeMap<String, JobConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobKind {
    /// `interval` is a cron expression.
    #[serde(rename = "CRONJOB", alias = "cron")]
    Cron,
    /// `interval` is a duration string such as "30s".
    #[serde(rename = "DURATIONJOB", alias = "duration")]
    Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(rename = "type")]
    pub kind: JobKind,
    pub interval: String,
    /// Cron expressions carry a leading seconds field.
    #[serde(default)]
    pub use_seconds: bool,
    pub external_address: String,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Constant delay between attempts.
    #[serde(default = "default_retry_duration")]
    pub duration: String,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_duration() -> String {
    "1s".to_string()
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            duration: default_retry_duration(),
        }
    }
}

impl RetryConfig {
    pub fn delay(&self) -> Result<Duration, ConfigError> {
        parse_duration(&self.duration).map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

impl PollerConfig {
    /// Parse config from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yaml::from_str(yaml)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    pub fn job(&self, name: &str) -> Option<&JobConfig> {
        self.jobs.get(name)
    }

    // ── Environment variable overrides ──────────────────────────────

    /// Apply environment variable overrides.
    ///
    /// Convention: `POLLER_JOB_<NAME>_<FIELD>` overrides `jobs.<name>.<field>`,
    /// with the job name upper-cased and `-` replaced by `_`. Examples:
    /// - `POLLER_JOB_POLLER_ENABLED` -> `jobs.poller.enabled`
    /// - `POLLER_JOB_POLLER_INTERVAL` -> `jobs.poller.interval`
    /// - `POLLER_JOB_POLLER_EXTERNAL_ADDRESS` -> `jobs.poller.external_address`
    /// - `POLLER_JOB_POLLER_RETRY_MAX_ATTEMPTS` -> `jobs.poller.retry.max_attempts`
    /// - `POLLER_JOB_POLLER_RETRY_DURATION` -> `jobs.poller.retry.duration`
    pub(crate) fn apply_env_overrides(&mut self) {
        for (name, job) in self.jobs.iter_mut() {
            let prefix = format!("POLLER_JOB_{}", name.to_uppercase().replace('-', "_"));
            let var = |field: &str| std::env::var(format!("{prefix}_{field}")).ok();

            if let Some(v) = var("ENABLED") {
                if let Ok(enabled) = v.parse::<bool>() {
                    job.enabled = enabled;
                }
            }
            if let Some(v) = var("INTERVAL") {
                job.interval = v;
            }
            if let Some(v) = var("USE_SECONDS") {
                if let Ok(use_seconds) = v.parse::<bool>() {
                    job.use_seconds = use_seconds;
                }
            }
            if let Some(v) = var("EXTERNAL_ADDRESS") {
                job.external_address = v;
            }
            if let Some(v) = var("RETRY_MAX_ATTEMPTS") {
                if let Ok(n) = v.parse::<u32>() {
                    job.retry.max_attempts = n;
                }
            }
            if let Some(v) = var("RETRY_DURATION") {
                job.retry.duration = v;
            }
        }
    }

    // ── Validation ──────────────────────────────────────────────────

    /// Validate every enabled job. Disabled jobs are not inspected.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, job) in self.jobs.iter().filter(|(_, j)| j.enabled) {
            Trigger::from_config(name, job).map_err(|e| ConfigError::Invalid(e.to_string()))?;

            if reqwest::Url::parse(&job.external_address).is_err() {
                return Err(ConfigError::Invalid(format!(
                    "job '{name}' has invalid external_address '{}'",
                    job.external_address
                )));
            }
            if job.retry.max_attempts == 0 {
                return Err(ConfigError::Invalid(format!(
                    "job '{name}' must allow at least one retry attempt"
                )));
            }
            job.retry.delay().map_err(|e| {
                ConfigError::Invalid(format!("job '{name}' retry duration: {e}"))
            })?;
        }
        Ok(())
    }
}
