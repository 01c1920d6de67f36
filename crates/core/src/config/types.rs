use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub csv: CsvConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where run artifacts and manifests live.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Root of the run-artifact tree.
    #[serde(default = "default_artifact_root")]
    pub artifact_root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            artifact_root: default_artifact_root(),
        }
    }
}

fn default_artifact_root() -> PathBuf {
    PathBuf::from("runs")
}

/// CSV ingestion limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CsvConfig {
    /// Inputs larger than this are rejected before parsing.
    #[serde(default = "default_max_file_size")]
    pub max_file_size_bytes: u64,

    /// User-supplied paths must resolve inside this directory when set.
    #[serde(default)]
    pub allowed_root: Option<PathBuf>,

    /// Accepted file extensions, compared case-insensitively.
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
}

impl Default for CsvConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: default_max_file_size(),
            allowed_root: None,
            allowed_extensions: default_allowed_extensions(),
        }
    }
}

fn default_max_file_size() -> u64 {
    10 * 1024 * 1024 // 10 MiB
}

fn default_allowed_extensions() -> Vec<String> {
    vec!["csv".to_string()]
}

/// Dispatch settings for the orchestrator.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExecutionConfig {
    /// Maximum jobs running at the same time.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Per-job timeout in seconds.
    #[serde(default = "default_job_timeout")]
    pub job_timeout_secs: u64,
}

impl ExecutionConfig {
    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            job_timeout_secs: default_job_timeout(),
        }
    }
}

fn default_max_concurrency() -> usize {
    4
}

fn default_job_timeout() -> u64 {
    300 // 5 minutes
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    /// Jobs with this many attempts are no longer retried automatically.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,

    /// Upper bound for any single retry delay, in milliseconds.
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_base() -> u64 {
    1000
}

fn default_max_backoff() -> u64 {
    60_000
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_empty_uses_defaults() {
        let config: EngineConfig = toml::from_str("").unwrap();
        assert_eq!(config.storage.artifact_root.to_str().unwrap(), "runs");
        assert_eq!(config.csv.max_file_size_bytes, 10 * 1024 * 1024);
        assert_eq!(config.csv.allowed_extensions, vec!["csv".to_string()]);
        assert!(config.csv.allowed_root.is_none());
        assert_eq!(config.execution.max_concurrency, 4);
        assert_eq!(config.execution.job_timeout(), Duration::from_secs(300));
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
    }

    #[test]
    fn test_deserialize_full() {
        let toml = r#"
[storage]
artifact_root = "/var/lib/rowbatch"

[csv]
max_file_size_bytes = 2048
allowed_root = "/srv/uploads"
allowed_extensions = ["csv", "tsv"]

[execution]
max_concurrency = 2
job_timeout_secs = 30

[retry]
max_retries = 4
backoff_base_ms = 250
max_backoff_ms = 4000

[logging]
level = "debug"
json = true
"#;
        let config: EngineConfig = toml::from_str(toml).unwrap();
        assert_eq!(
            config.storage.artifact_root.to_str().unwrap(),
            "/var/lib/rowbatch"
        );
        assert_eq!(config.csv.max_file_size_bytes, 2048);
        assert_eq!(
            config.csv.allowed_root.as_deref().and_then(|p| p.to_str()),
            Some("/srv/uploads")
        );
        assert_eq!(config.csv.allowed_extensions.len(), 2);
        assert_eq!(config.execution.max_concurrency, 2);
        assert_eq!(config.execution.job_timeout_secs, 30);
        assert_eq!(config.retry.backoff_base_ms, 250);
        assert_eq!(config.retry.max_backoff_ms, 4000);
        assert!(config.logging.json);
    }
}
