//! Testing utilities and mock implementations.
//!
//! Provides a scripted [`MockExecutor`] and a [`RecordingMetrics`] sink so the
//! engine can be exercised end to end without a real executor.
//!
//! # Example
//!
//! ```rust,ignore
//! use rowbatch_core::testing::{fixtures, MockExecutor};
//!
//! let dir = tempfile::TempDir::new()?;
//! let csv = fixtures::write_csv(dir.path(), "orders.csv", &fixtures::csv_text(3))?;
//! let executor = MockExecutor::new();
//! executor.fail_when("id", "2", "boom").await;
//! ```

mod mock_executor;
mod recording_metrics;

pub use mock_executor::{MockBehavior, MockExecutor};
pub use recording_metrics::{RecordedEvent, RecordingMetrics};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::{Path, PathBuf};

    use crate::config::EngineConfig;
    use crate::model::JobParams;

    /// Rows with an `id` (1-based) and a `url` column.
    pub fn rows(count: usize) -> Vec<JobParams> {
        (1..=count)
            .map(|i| {
                [
                    ("id", i.to_string()),
                    ("url", format!("https://example.com/item/{}", i)),
                ]
                .into_iter()
                .collect()
            })
            .collect()
    }

    /// CSV text matching [`rows`].
    pub fn csv_text(count: usize) -> String {
        let mut text = String::from("id,url\n");
        for i in 1..=count {
            text.push_str(&format!("{},https://example.com/item/{}\n", i, i));
        }
        text
    }

    /// Writes `content` to `dir/name`.
    pub fn write_csv(dir: &Path, name: &str, content: &str) -> std::io::Result<PathBuf> {
        let path = dir.join(name);
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Engine config rooted at `artifact_root` with millisecond backoff.
    pub fn engine_config(artifact_root: &Path) -> EngineConfig {
        let mut config = EngineConfig::default();
        config.storage.artifact_root = artifact_root.to_path_buf();
        config.execution.max_concurrency = 2;
        config.execution.job_timeout_secs = 5;
        config.retry.max_retries = 3;
        config.retry.backoff_base_ms = 1;
        config.retry.max_backoff_ms = 10;
        config
    }
}
