//! Job entity and its status lifecycle.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::params::JobParams;
use crate::error::BatchError;

/// Status of a single job.
///
/// `pending → running → {success | failed}`, and `failed → retrying → running`
/// through the retry handler.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Success,
    Failed,
    Retrying,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Retrying => "retrying",
        }
    }

    /// Whether the engine's state machine allows moving to `next`.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Running, Success)
                | (Running, Failed)
                | (Failed, Retrying)
                | (Retrying, Running)
        )
    }

    /// `success` or `failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = BatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            "retrying" => Ok(Self::Retrying),
            other => Err(BatchError::Configuration(format!(
                "unknown job status: {}",
                other
            ))),
        }
    }
}

/// Deterministic job id: batch id plus zero-padded row index.
pub fn job_id_for(batch_id: &str, row_index: usize) -> String {
    format!("{}-{:04}", batch_id, row_index)
}

/// One unit of work derived from a CSV row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub job_id: String,
    pub row_index: usize,
    pub params: JobParams,
    pub status: JobStatus,
    pub attempts: u32,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub artifact_refs: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Creates a pending job with no attempts.
    pub fn new(batch_id: &str, row_index: usize, params: JobParams) -> Self {
        Self {
            job_id: job_id_for(batch_id, row_index),
            row_index,
            params,
            status: JobStatus::Pending,
            attempts: 0,
            error_message: None,
            artifact_refs: BTreeSet::new(),
            started_at: None,
            finished_at: None,
        }
    }

    fn transition(&mut self, next: JobStatus) -> Result<(), BatchError> {
        if !self.status.can_transition_to(next) {
            return Err(BatchError::Engine(format!(
                "invalid transition for job {}: {} -> {}",
                self.job_id, self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }

    /// Marks the job as dispatched and counts the attempt.
    pub fn mark_running(&mut self) -> Result<(), BatchError> {
        self.transition(JobStatus::Running)?;
        self.attempts += 1;
        self.error_message = None;
        self.started_at = Some(Utc::now());
        self.finished_at = None;
        Ok(())
    }

    pub fn mark_succeeded<I>(&mut self, artifacts: I) -> Result<(), BatchError>
    where
        I: IntoIterator<Item = String>,
    {
        self.transition(JobStatus::Success)?;
        self.error_message = None;
        self.artifact_refs.extend(artifacts);
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    pub fn mark_failed(&mut self, message: impl Into<String>) -> Result<(), BatchError> {
        self.transition(JobStatus::Failed)?;
        self.error_message = Some(message.into());
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    pub fn mark_retrying(&mut self) -> Result<(), BatchError> {
        self.transition(JobStatus::Retrying)
    }

    /// Puts a job waiting for a retry back to `failed`, keeping its last error.
    pub fn abandon_retry(&mut self) -> Result<(), BatchError> {
        if self.status != JobStatus::Retrying {
            return Err(BatchError::Engine(format!(
                "job {} is {}, not retrying",
                self.job_id, self.status
            )));
        }
        self.status = JobStatus::Failed;
        Ok(())
    }

    /// Whether the dispatcher may start this job.
    pub fn is_dispatchable(&self) -> bool {
        matches!(self.status, JobStatus::Pending | JobStatus::Retrying)
    }

    /// Returns an interrupted job to the queue. Attempts are kept.
    pub fn reset_to_pending(&mut self) {
        self.status = JobStatus::Pending;
        self.started_at = None;
        self.finished_at = None;
    }

    /// Manual status override outside the dispatch state machine.
    ///
    /// Only `pending`, `success` and `failed` can be set, and never on a job
    /// that is currently running.
    pub fn override_status(&mut self, status: JobStatus) -> Result<(), BatchError> {
        if self.status == JobStatus::Running {
            return Err(BatchError::Engine(format!(
                "job {} is running and cannot be updated",
                self.job_id
            )));
        }

        match status {
            JobStatus::Pending => {
                self.reset_to_pending();
                self.error_message = None;
            }
            JobStatus::Success => {
                self.status = JobStatus::Success;
                self.error_message = None;
                self.finished_at = Some(Utc::now());
            }
            JobStatus::Failed => {
                self.status = JobStatus::Failed;
                self.error_message = Some("marked failed manually".to_string());
                self.finished_at = Some(Utc::now());
            }
            other => {
                return Err(BatchError::Configuration(format!(
                    "status {} cannot be set manually",
                    other
                )))
            }
        }
        Ok(())
    }

    /// Adds an artifact reference. Returns `false` if it was already recorded.
    pub fn add_artifact(&mut self, artifact_ref: impl Into<String>) -> bool {
        self.artifact_refs.insert(artifact_ref.into())
    }
}
