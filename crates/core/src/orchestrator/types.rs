//! Types for the batch orchestrator.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::model::{BatchSummary, JobStatus};

/// Cooperative cancellation flag shared between a run and whoever stops it.
///
/// Setting the flag stops new dispatches. Jobs already running finish.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a stop. Returns immediately.
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How a single dispatch ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum JobVerdict {
    Succeeded(Vec<String>),
    Failed(String),
    TimedOut(Duration),
    Panicked(String),
}

impl JobVerdict {
    /// Metrics label.
    pub(crate) fn outcome(&self) -> &'static str {
        match self {
            Self::Succeeded(_) => "success",
            Self::Failed(_) | Self::Panicked(_) => "failed",
            Self::TimedOut(_) => "timeout",
        }
    }
}

/// State of a job after one dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: String,
    pub row_index: usize,
    pub status: JobStatus,
    pub attempts: u32,
    pub error_message: Option<String>,
    pub duration_ms: u64,
}

/// Result of one `execute` pass over a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub batch_id: String,
    /// Jobs dispatched during this pass.
    pub dispatched: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Jobs not dispatched: already finished, or manually updated while queued.
    pub skipped: usize,
    /// Jobs reset from `running`/`retrying` left behind by a crashed run.
    pub recovered: usize,
    /// Whether the stop flag ended the pass early.
    pub stopped: bool,
    /// Per-job results, in row order.
    pub results: Vec<JobResult>,
    pub summary: BatchSummary,
}
