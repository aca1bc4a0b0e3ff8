//! Worker and store configuration (YAML + environment)
//!
//! ```yaml
//! version: 1
//! worker:
//!   worker_interval_ms: 1000
//!   lease_duration_ms: 60000
//!   concurrency: 8
//!   id_prefix: exhaustive-search-worker
//! store:
//!   path: search_jobs.db
//!   max_attempts: 3
//!   busy_timeout_ms: 5000
//! ```
//!
//! Every section and field is optional except `version`. Environment
//! variables (`SEARCH_JOBS_*`) override the file.

use searchjob_storage::StoreOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

pub const ENV_WORKER_INTERVAL_MS: &str = "SEARCH_JOBS_WORKER_INTERVAL_MS";
pub const ENV_LEASE_DURATION_MS: &str = "SEARCH_JOBS_LEASE_DURATION_MS";
pub const ENV_CONCURRENCY: &str = "SEARCH_JOBS_CONCURRENCY";
pub const ENV_MAX_ATTEMPTS: &str = "SEARCH_JOBS_MAX_ATTEMPTS";
pub const ENV_DB_PATH: &str = "SEARCH_JOBS_DB_PATH";

const SUPPORTED_VERSIONS: &[u32] = &[1];

/// Configuration error type
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Range validation error
    #[error("Invalid range for field '{field}': {value} not in {min}..={max}")]
    Range {
        field: &'static str,
        value: String,
        min: String,
        max: String,
    },

    #[error("Invalid value for field '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },

    /// Environment override that does not parse
    #[error("Environment variable {key}={value:?} is not a valid number")]
    Env { key: &'static str, value: String },

    #[error("Unsupported configuration version {found}. Supported versions: {}", SUPPORTED_VERSIONS.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", "))]
    UnsupportedVersion { found: u32 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Worker pool settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkerConfig {
    /// Idle sleep between polls when no task is available
    pub worker_interval_ms: u64,
    /// Lease granted per claim; extended by heartbeats
    pub lease_duration_ms: u64,
    /// Number of worker loops per pool
    pub concurrency: usize,
    /// Worker ids are `<id_prefix>-<instance>-<n>`
    pub id_prefix: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_interval_ms: 1000,
            lease_duration_ms: 60_000,
            concurrency: num_cpus::get(),
            id_prefix: "exhaustive-search-worker".to_string(),
        }
    }
}

impl WorkerConfig {
    pub fn worker_interval(&self) -> Duration {
        Duration::from_millis(self.worker_interval_ms)
    }

    pub fn lease_duration(&self) -> Duration {
        Duration::from_millis(self.lease_duration_ms)
    }

    /// Ids for one pool, `<id_prefix>-<instance>-<n>` for `n` in
    /// `0..concurrency`. `<instance>` is generated per call, so pools in
    /// different processes sharing a database never reuse a lease owner.
    pub fn worker_ids(&self) -> Vec<String> {
        let instance = Uuid::new_v4().simple().to_string();
        (0..self.concurrency)
            .map(|n| format!("{}-{}-{}", self.id_prefix, instance, n))
            .collect()
    }
}

/// Job store settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    pub path: PathBuf,
    /// Lease ceiling per task
    pub max_attempts: u32,
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("search_jobs.db"),
            max_attempts: 3,
            busy_timeout_ms: 5000,
        }
    }
}

impl StoreConfig {
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            max_attempts: self.max_attempts,
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
        }
    }
}

/// YAML Schema v1
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFileV1 {
    version: u32,

    #[serde(default)]
    worker: WorkerConfig,

    #[serde(default)]
    store: StoreConfig,
}

/// Complete configuration for the search jobs subsystem.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchJobsConfig {
    pub worker: WorkerConfig,
    pub store: StoreConfig,
}

impl SearchJobsConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> ConfigResult<Self> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load a YAML file, then apply environment overrides.
    pub fn from_yaml(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::parse_yaml(&content)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse YAML content without consulting the environment.
    pub fn from_yaml_str(content: &str) -> ConfigResult<Self> {
        let config = Self::parse_yaml(content)?;
        config.validate()?;
        Ok(config)
    }

    fn parse_yaml(content: &str) -> ConfigResult<Self> {
        let file: ConfigFileV1 = serde_yaml::from_str(content)?;
        if !SUPPORTED_VERSIONS.contains(&file.version) {
            return Err(ConfigError::UnsupportedVersion {
                found: file.version,
            });
        }
        Ok(Self {
            worker: file.worker,
            store: file.store,
        })
    }

    pub fn to_yaml(&self) -> ConfigResult<String> {
        let file = ConfigFileV1 {
            version: 1,
            worker: self.worker.clone(),
            store: self.store.clone(),
        };
        Ok(serde_yaml::to_string(&file)?)
    }

    /// Apply `SEARCH_JOBS_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parse_env(&lookup, ENV_WORKER_INTERVAL_MS)? {
            self.worker.worker_interval_ms = v;
        }
        if let Some(v) = parse_env(&lookup, ENV_LEASE_DURATION_MS)? {
            self.worker.lease_duration_ms = v;
        }
        if let Some(v) = parse_env(&lookup, ENV_CONCURRENCY)? {
            self.worker.concurrency = v;
        }
        if let Some(v) = parse_env(&lookup, ENV_MAX_ATTEMPTS)? {
            self.store.max_attempts = v;
        }
        if let Some(path) = lookup(ENV_DB_PATH) {
            self.store.path = PathBuf::from(path);
        }
        Ok(())
    }

    pub fn validate(&self) -> ConfigResult<()> {
        check_range("worker.worker_interval_ms", self.worker.worker_interval_ms, 1, 3_600_000)?;
        check_range("worker.lease_duration_ms", self.worker.lease_duration_ms, 1, 86_400_000)?;
        check_range("worker.concurrency", self.worker.concurrency, 1, 1024)?;
        check_range("store.max_attempts", self.store.max_attempts, 1, 100)?;
        check_range("store.busy_timeout_ms", self.store.busy_timeout_ms, 0, 600_000)?;

        if self.worker.id_prefix.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "worker.id_prefix",
                reason: "must not be empty".to_string(),
            });
        }
        if self.store.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid {
                field: "store.path",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_env<F, T>(lookup: &F, key: &'static str) -> ConfigResult<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Env { key, value: raw }),
    }
}

fn check_range<T>(field: &'static str, value: T, min: T, max: T) -> ConfigResult<()>
where
    T: PartialOrd + std::fmt::Display,
{
    if value < min || value > max {
        return Err(ConfigError::Range {
            field,
            value: value.to_string(),
            min: min.to_string(),
            max: max.to_string(),
        });
    }
    Ok(())
}
