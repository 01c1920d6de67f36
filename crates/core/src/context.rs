//! Run-scoped context passed to the store and orchestrator.

use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::error::BatchError;
use crate::model::validate_identifier;

/// File name of every persisted manifest.
pub const MANIFEST_FILE_NAME: &str = "manifest.json";

/// Identifies the current process invocation and where its artifacts live.
///
/// Layout: `<artifact_root>/runs/<run_id>/batches/<batch_id>/manifest.json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    run_id: String,
    artifact_root: PathBuf,
}

impl RunContext {
    /// Creates a context with a fresh run id, e.g. `run-20260101T120000-1a2b3c4d`.
    pub fn new(artifact_root: impl Into<PathBuf>) -> Self {
        let uuid = uuid::Uuid::new_v4().simple().to_string();
        Self {
            run_id: format!("run-{}-{}", Utc::now().format("%Y%m%dT%H%M%S"), &uuid[..8]),
            artifact_root: artifact_root.into(),
        }
    }

    /// Creates a context for an existing run id.
    pub fn with_run_id(
        artifact_root: impl Into<PathBuf>,
        run_id: impl Into<String>,
    ) -> Result<Self, BatchError> {
        let run_id = run_id.into();
        validate_identifier("run id", &run_id)?;
        Ok(Self {
            run_id,
            artifact_root: artifact_root.into(),
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn artifact_root(&self) -> &Path {
        &self.artifact_root
    }

    /// Directory holding every run.
    pub fn runs_dir(&self) -> PathBuf {
        self.artifact_root.join("runs")
    }

    /// Directory of the current run.
    pub fn run_dir(&self) -> PathBuf {
        self.runs_dir().join(&self.run_id)
    }

    pub fn batch_dir(&self, batch_id: &str) -> PathBuf {
        self.run_dir().join("batches").join(batch_id)
    }

    /// Where a manifest created in this run is stored.
    pub fn manifest_path(&self, batch_id: &str) -> PathBuf {
        self.batch_dir(batch_id).join(MANIFEST_FILE_NAME)
    }
}
