//! Batch-level record of truth.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::validate_batch_id;
use super::job::{Job, JobStatus};
use super::params::JobParams;
use crate::error::BatchError;

/// A batch and all of its jobs.
///
/// `total_jobs`, `completed_jobs` and `failed_jobs` are derived from `jobs`
/// and recomputed before every save.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Manifest {
    pub batch_id: String,
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_csv: Option<String>,
    #[serde(default)]
    pub columns: Vec<String>,
    pub total_jobs: usize,
    pub completed_jobs: usize,
    pub failed_jobs: usize,
    pub jobs: Vec<Job>,
}

/// Status counts for one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub batch_id: String,
    pub run_id: String,
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub retrying: usize,
    pub success: usize,
    pub failed: usize,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl BatchSummary {
    /// No job left to run.
    pub fn is_finished(&self) -> bool {
        self.pending + self.running + self.retrying == 0
    }
}

impl Manifest {
    /// Creates an empty manifest.
    pub fn new(batch_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            batch_id: batch_id.into(),
            run_id: run_id.into(),
            created_at: Utc::now(),
            updated_at: None,
            source_csv: None,
            columns: Vec::new(),
            total_jobs: 0,
            completed_jobs: 0,
            failed_jobs: 0,
            jobs: Vec::new(),
        }
    }

    /// Number of jobs in `status`.
    pub fn count(&self, status: JobStatus) -> usize {
        self.jobs.iter().filter(|j| j.status == status).count()
    }

    /// Rebuilds the derived counters from `jobs`.
    pub fn recompute_counters(&mut self) {
        self.total_jobs = self.jobs.len();
        self.completed_jobs = self.count(JobStatus::Success);
        self.failed_jobs = self.count(JobStatus::Failed);
    }

    pub fn find_job(&self, job_id: &str) -> Option<&Job> {
        self.jobs.iter().find(|j| j.job_id == job_id)
    }

    pub fn find_job_mut(&mut self, job_id: &str) -> Option<&mut Job> {
        self.jobs.iter_mut().find(|j| j.job_id == job_id)
    }

    /// Ids of jobs in `status`, in row order.
    pub fn job_ids_with_status(&self, status: JobStatus) -> Vec<String> {
        self.jobs
            .iter()
            .filter(|j| j.status == status)
            .map(|j| j.job_id.clone())
            .collect()
    }

    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            batch_id: self.batch_id.clone(),
            run_id: self.run_id.clone(),
            total: self.jobs.len(),
            pending: self.count(JobStatus::Pending),
            running: self.count(JobStatus::Running),
            retrying: self.count(JobStatus::Retrying),
            success: self.count(JobStatus::Success),
            failed: self.count(JobStatus::Failed),
            created_at: Some(self.created_at),
            updated_at: self.updated_at,
        }
    }

    /// Checks structural invariants: unique job ids and consistent counters.
    pub fn validate(&self) -> Result<(), BatchError> {
        let mut seen = HashSet::with_capacity(self.jobs.len());
        for job in &self.jobs {
            if !seen.insert(job.job_id.as_str()) {
                return Err(BatchError::Engine(format!(
                    "duplicate job id in batch {}: {}",
                    self.batch_id, job.job_id
                )));
            }
        }

        if self.total_jobs != self.jobs.len()
            || self.completed_jobs != self.count(JobStatus::Success)
            || self.failed_jobs != self.count(JobStatus::Failed)
        {
            return Err(BatchError::Engine(format!(
                "counter drift in batch {}: total={} completed={} failed={} jobs={}",
                self.batch_id,
                self.total_jobs,
                self.completed_jobs,
                self.failed_jobs,
                self.jobs.len()
            )));
        }

        Ok(())
    }
}

/// Builds a manifest with one pending job per row.
///
/// Job ids are derived from `batch_id` and the row index, so the same rows
/// and batch id always produce the same ids in the same order.
pub fn create_batch_jobs(
    rows: Vec<JobParams>,
    batch_id: &str,
    run_id: &str,
) -> Result<Manifest, BatchError> {
    validate_batch_id(batch_id)?;

    let mut manifest = Manifest::new(batch_id, run_id);
    manifest.columns = rows
        .first()
        .map(|r| r.keys().map(str::to_string).collect())
        .unwrap_or_default();
    manifest.jobs = rows
        .into_iter()
        .enumerate()
        .map(|(row_index, params)| Job::new(batch_id, row_index, params))
        .collect();
    manifest.recompute_counters();
    manifest.validate()?;
    Ok(manifest)
}
