//! The job executor seam.
//!
//! The engine does not know what a job does. It hands a row's parameters to a
//! [`JobExecutor`] and records whatever [`ExecutionOutcome`] comes back.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::JobParams;

/// Result of running one job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<String>,
}

impl ExecutionOutcome {
    pub fn success() -> Self {
        Self {
            success: true,
            error: None,
            artifacts: Vec::new(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            artifacts: Vec::new(),
        }
    }

    /// Attaches artifact references produced by the job.
    pub fn with_artifacts<I, S>(mut self, artifacts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.artifacts.extend(artifacts.into_iter().map(Into::into));
        self
    }
}

/// Performs the work for one job.
///
/// Failures are reported through the returned outcome, never as errors.
/// Implementations may be called concurrently for different rows.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(&self, params: &JobParams) -> ExecutionOutcome;
}
