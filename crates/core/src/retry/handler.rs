//! Partial retry of failed jobs.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::backoff::BackoffPolicy;
use crate::error::BatchError;
use crate::metrics::{self, events};
use crate::model::{BatchSummary, JobStatus, Manifest};
use crate::orchestrator::{BatchOrchestrator, JobResult, StopFlag};
use crate::store::SharedManifest;

/// Result of one retry pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryReport {
    pub batch_id: String,
    /// Jobs chosen for retry, in row order.
    pub selected: Vec<String>,
    /// Total re-dispatches across all selected jobs.
    pub dispatches: usize,
    /// Selected jobs that ended in `success`.
    pub succeeded: Vec<String>,
    /// Selected jobs still `failed` after their last allowed attempt.
    pub exhausted: Vec<String>,
    pub stopped: bool,
    /// Last dispatch result per job, in row order.
    pub results: Vec<JobResult>,
    pub summary: BatchSummary,
}

/// Re-dispatches failed jobs through the orchestrator's single-job path.
#[derive(Clone)]
pub struct RetryHandler {
    orchestrator: BatchOrchestrator,
    policy: BackoffPolicy,
}

impl RetryHandler {
    pub fn new(orchestrator: BatchOrchestrator, policy: BackoffPolicy) -> Self {
        Self {
            orchestrator,
            policy,
        }
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Retries failed jobs until they succeed or reach `max_retries` attempts.
    ///
    /// Without `job_ids`, every failed job with fewer than `max_retries`
    /// attempts is selected. Explicit ids must name failed jobs and are
    /// dispatched at least once even when already exhausted. Successful jobs
    /// are never touched.
    pub async fn retry_batch_jobs(
        &self,
        manifest: &SharedManifest,
        job_ids: Option<&[String]>,
        max_retries: u32,
        stop: &StopFlag,
    ) -> Result<RetryReport, BatchError> {
        if max_retries < 1 {
            return Err(BatchError::Configuration(
                "max_retries must be at least 1".to_string(),
            ));
        }

        let (batch_id, selected) = {
            let guard = manifest.lock().await;
            let selected = select_jobs(&guard, job_ids, max_retries)?;
            (guard.batch_id.clone(), selected)
        };

        if selected.is_empty() {
            info!("Batch {}: no failed jobs eligible for retry", batch_id);
        } else {
            info!(
                "Retrying {} job(s) in batch {} (max_retries {})",
                selected.len(),
                batch_id,
                max_retries
            );
        }

        let slots = Arc::new(Semaphore::new(self.orchestrator.config().max_concurrency));
        let mut tasks = JoinSet::new();
        for job_id in selected.clone() {
            let this = self.clone();
            let manifest = Arc::clone(manifest);
            let slots = Arc::clone(&slots);
            let stop = stop.clone();
            tasks.spawn(async move {
                this.retry_job(&manifest, &job_id, max_retries, &slots, &stop)
                    .await
            });
        }

        let mut dispatches = 0;
        let mut results = Vec::new();
        let mut first_error: Option<BatchError> = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok((rounds, last))) => {
                    dispatches += rounds;
                    results.extend(last);
                }
                Ok(Err(e)) => {
                    error!("Batch {}: retry failed: {}", batch_id, e);
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    error!("Batch {}: retry task aborted: {}", batch_id, e);
                    first_error
                        .get_or_insert(BatchError::Engine(format!("retry task aborted: {}", e)));
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        results.sort_by_key(|r| r.row_index);
        let summary = manifest.lock().await.summary();
        let succeeded: Vec<String> = results
            .iter()
            .filter(|r| r.status == JobStatus::Success)
            .map(|r| r.job_id.clone())
            .collect();
        let exhausted: Vec<String> = results
            .iter()
            .filter(|r| r.status == JobStatus::Failed && r.attempts >= max_retries)
            .map(|r| r.job_id.clone())
            .collect();

        info!(
            "Batch {} retry finished: {} dispatch(es), {} recovered, {} exhausted",
            batch_id,
            dispatches,
            succeeded.len(),
            exhausted.len()
        );

        Ok(RetryReport {
            batch_id,
            selected,
            dispatches,
            succeeded,
            exhausted,
            stopped: stop.is_stopped(),
            results,
            summary,
        })
    }

    /// Retry loop for one job. Returns the number of dispatches and the last result.
    async fn retry_job(
        &self,
        manifest: &SharedManifest,
        job_id: &str,
        max_retries: u32,
        slots: &Arc<Semaphore>,
        stop: &StopFlag,
    ) -> Result<(usize, Option<JobResult>), BatchError> {
        let mut rounds = 0;
        let mut last = None;

        loop {
            if stop.is_stopped() {
                debug!(job_id = %job_id, "Stop requested, leaving job failed");
                break;
            }

            let attempts = {
                let mut guard = manifest.lock().await;
                let batch_id = guard.batch_id.clone();
                let job = guard.find_job_mut(job_id).ok_or_else(|| {
                    BatchError::Engine(format!("job {} not found in batch {}", job_id, batch_id))
                })?;
                if job.status != JobStatus::Failed {
                    break;
                }
                job.mark_retrying()?;
                let attempts = job.attempts;
                self.orchestrator.store().save_manifest(&mut guard)?;
                attempts
            };

            let delay = self.policy.delay_for(attempts);
            debug!(
                job_id = %job_id,
                attempts,
                delay_ms = delay.as_millis() as u64,
                "Backing off before retry"
            );
            tokio::time::sleep(delay).await;
            if stop.is_stopped() {
                self.abandon_retry(manifest, job_id).await?;
                break;
            }

            let _permit = slots
                .acquire()
                .await
                .map_err(|_| BatchError::Engine("retry pool closed".to_string()))?;
            // A stop may have arrived while waiting for a slot.
            if stop.is_stopped() {
                self.abandon_retry(manifest, job_id).await?;
                break;
            }

            let Some(result) = self.orchestrator.dispatch_job(manifest, job_id).await? else {
                break;
            };
            metrics::emit(self.orchestrator.metrics(), events::JOB_RETRIED, &[], 1.0);
            rounds += 1;

            let done = result.status != JobStatus::Failed || result.attempts >= max_retries;
            if result.status == JobStatus::Failed && result.attempts >= max_retries {
                warn!(
                    "Job {} exhausted {} attempt(s), leaving it failed",
                    job_id, result.attempts
                );
            }
            last = Some(result);
            if done {
                break;
            }
        }

        Ok((rounds, last))
    }

    /// Returns a job that was waiting for its retry to `failed`.
    ///
    /// Jobs changed by a manual update in the meantime are left alone.
    async fn abandon_retry(
        &self,
        manifest: &SharedManifest,
        job_id: &str,
    ) -> Result<(), BatchError> {
        let mut guard = manifest.lock().await;
        let Some(job) = guard.find_job_mut(job_id) else {
            return Ok(());
        };
        if job.status != JobStatus::Retrying {
            return Ok(());
        }
        job.abandon_retry()?;
        debug!(job_id = %job_id, "Stop requested during backoff, leaving job failed");
        self.orchestrator.store().save_manifest(&mut guard)?;
        Ok(())
    }
}

/// Picks the jobs a retry pass will work on, in row order.
fn select_jobs(
    manifest: &Manifest,
    job_ids: Option<&[String]>,
    max_retries: u32,
) -> Result<Vec<String>, BatchError> {
    let Some(ids) = job_ids else {
        return Ok(manifest
            .jobs
            .iter()
            .filter(|j| j.status == JobStatus::Failed && j.attempts < max_retries)
            .map(|j| j.job_id.clone())
            .collect());
    };

    let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
    for id in &wanted {
        let job = manifest.find_job(id).ok_or_else(|| {
            BatchError::Configuration(format!(
                "job {} not found in batch {}",
                id, manifest.batch_id
            ))
        })?;
        if job.status != JobStatus::Failed {
            return Err(BatchError::Configuration(format!(
                "job {} is {}, only failed jobs can be retried",
                id, job.status
            )));
        }
    }

    Ok(manifest
        .jobs
        .iter()
        .filter(|j| wanted.contains(j.job_id.as_str()))
        .map(|j| j.job_id.clone())
        .collect())
}
