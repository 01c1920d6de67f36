//! Batch orchestrator implementation.

use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::error::BatchError;
use crate::executor::{ExecutionOutcome, JobExecutor};
use crate::metrics::{self, events, MetricsSink, SharedMetrics};
use crate::model::{JobParams, JobStatus, Manifest};
use crate::sanitize::sanitize_error;
use crate::store::{ManifestStore, SharedManifest};

use super::config::OrchestratorConfig;
use super::types::{ExecutionReport, JobResult, JobVerdict, StopFlag};

/// Drives the jobs of a manifest through the external executor.
#[derive(Clone)]
pub struct BatchOrchestrator {
    config: OrchestratorConfig,
    store: Arc<ManifestStore>,
    executor: Arc<dyn JobExecutor>,
    metrics: SharedMetrics,
}

impl BatchOrchestrator {
    pub fn new(
        config: OrchestratorConfig,
        store: Arc<ManifestStore>,
        executor: Arc<dyn JobExecutor>,
    ) -> Self {
        Self {
            config,
            store,
            executor,
            metrics: None,
        }
    }

    /// Reports job outcomes and durations to `sink`.
    pub fn with_metrics(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(sink);
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<ManifestStore> {
        &self.store
    }

    pub(crate) fn metrics(&self) -> &SharedMetrics {
        &self.metrics
    }

    /// Runs every `pending` job of the manifest.
    ///
    /// Jobs are dispatched in row order with at most `max_concurrency` in
    /// flight. Finished jobs are skipped. The stop flag is checked before each
    /// dispatch; jobs already running are left to finish. Per-job failures are
    /// recorded on the job, only persistence failures end the pass with an
    /// error.
    pub async fn execute_batch_jobs(
        &self,
        manifest: &SharedManifest,
        stop: &StopFlag,
    ) -> Result<ExecutionReport, BatchError> {
        let (batch_id, queue, mut skipped, recovered) = {
            let mut guard = manifest.lock().await;
            let recovered = recover_interrupted(&mut guard);
            if recovered > 0 {
                warn!(
                    "Batch {}: reset {} interrupted job(s) to pending",
                    guard.batch_id, recovered
                );
                self.store.save_manifest(&mut guard)?;
            }
            let queue = guard.job_ids_with_status(JobStatus::Pending);
            let skipped = guard.jobs.len() - queue.len();
            (guard.batch_id.clone(), queue, skipped, recovered)
        };

        info!(
            "Executing batch {}: {} job(s) to dispatch, {} skipped, concurrency {}",
            batch_id,
            queue.len(),
            skipped,
            self.config.max_concurrency
        );
        metrics::emit(
            &self.metrics,
            events::BATCH_STARTED,
            &[],
            queue.len() as f64,
        );

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency));
        // Set by a task whose manifest save failed.
        let halt = StopFlag::new();
        let mut tasks = JoinSet::new();
        let mut stopped = false;
        let mut first_error: Option<BatchError> = None;

        for job_id in queue {
            if stop.is_stopped() {
                stopped = true;
                break;
            }

            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    first_error = Some(BatchError::Engine("dispatch pool closed".to_string()));
                    break;
                }
            };

            // A stop may have arrived while waiting for a slot.
            if stop.is_stopped() {
                stopped = true;
                break;
            }
            if halt.is_stopped() {
                break;
            }

            let params = match self.begin_job(manifest, &job_id).await {
                Ok(Some(params)) => params,
                // Overridden while queued; the permit goes back to the pool.
                Ok(None) => {
                    skipped += 1;
                    continue;
                }
                Err(e) => {
                    first_error = Some(e);
                    break;
                }
            };

            let this = self.clone();
            let manifest = Arc::clone(manifest);
            let halt = halt.clone();
            tasks.spawn(async move {
                let _permit = permit;
                let result = this.complete_job(&manifest, &job_id, params).await;
                if result.is_err() {
                    halt.stop();
                }
                result
            });
        }

        if stopped {
            info!("Batch {}: stop requested, waiting for in-flight jobs", batch_id);
        }

        let mut results = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(result)) => results.push(result),
                Ok(Err(e)) => {
                    error!("Batch {}: failed to record job result: {}", batch_id, e);
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    error!("Batch {}: job task aborted: {}", batch_id, e);
                    first_error
                        .get_or_insert(BatchError::Engine(format!("job task aborted: {}", e)));
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }

        results.sort_by_key(|r| r.row_index);
        let summary = manifest.lock().await.summary();
        let succeeded = results
            .iter()
            .filter(|r| r.status == JobStatus::Success)
            .count();
        let failed = results
            .iter()
            .filter(|r| r.status == JobStatus::Failed)
            .count();

        info!(
            "Batch {} pass finished: {} dispatched, {} succeeded, {} failed, {}/{} complete",
            batch_id,
            results.len(),
            succeeded,
            failed,
            summary.success,
            summary.total
        );

        Ok(ExecutionReport {
            batch_id,
            dispatched: results.len(),
            succeeded,
            failed,
            skipped,
            recovered,
            stopped,
            results,
            summary,
        })
    }

    /// Dispatches one job and waits for its outcome.
    ///
    /// Returns `None` without calling the executor when the job is no longer
    /// `pending` or `retrying`. Used by the retry handler.
    pub async fn dispatch_job(
        &self,
        manifest: &SharedManifest,
        job_id: &str,
    ) -> Result<Option<JobResult>, BatchError> {
        match self.begin_job(manifest, job_id).await? {
            Some(params) => Ok(Some(self.complete_job(manifest, job_id, params).await?)),
            None => Ok(None),
        }
    }

    /// Marks the job running and persists it.
    ///
    /// `None` means the job left the dispatchable states after it was queued,
    /// usually through a manual status update.
    async fn begin_job(
        &self,
        manifest: &SharedManifest,
        job_id: &str,
    ) -> Result<Option<JobParams>, BatchError> {
        let mut guard = manifest.lock().await;
        let batch_id = guard.batch_id.clone();
        let job = guard
            .find_job_mut(job_id)
            .ok_or_else(|| unknown_job(&batch_id, job_id))?;
        if !job.is_dispatchable() {
            info!(
                "Job {} is {} and no longer queued, skipping dispatch",
                job_id, job.status
            );
            return Ok(None);
        }
        job.mark_running()?;
        let params = job.params.clone();
        debug!(
            batch_id = %batch_id,
            job_id = %job_id,
            attempt = job.attempts,
            "Dispatching job"
        );
        self.store.save_manifest(&mut guard)?;
        Ok(Some(params))
    }

    async fn complete_job(
        &self,
        manifest: &SharedManifest,
        job_id: &str,
        params: JobParams,
    ) -> Result<JobResult, BatchError> {
        let started = Instant::now();
        let verdict = self.run_executor(params).await;
        let elapsed = started.elapsed();
        self.finish_job(manifest, job_id, verdict, elapsed).await
    }

    /// Calls the executor on its own task under the job timeout.
    ///
    /// A panic inside the executor surfaces as a `JoinError` here and becomes
    /// a failure. A timed out call is aborted.
    async fn run_executor(&self, params: JobParams) -> JobVerdict {
        let executor = Arc::clone(&self.executor);
        let mut handle = tokio::spawn(async move { executor.execute(&params).await });

        match tokio::time::timeout(self.config.job_timeout, &mut handle).await {
            Ok(Ok(outcome)) => verdict_from_outcome(outcome),
            Ok(Err(e)) if e.is_panic() => JobVerdict::Panicked(panic_message(e.into_panic())),
            Ok(Err(e)) => JobVerdict::Failed(format!("executor task cancelled: {}", e)),
            Err(_) => {
                handle.abort();
                JobVerdict::TimedOut(self.config.job_timeout)
            }
        }
    }

    /// Applies a verdict to the job and persists it.
    async fn finish_job(
        &self,
        manifest: &SharedManifest,
        job_id: &str,
        verdict: JobVerdict,
        elapsed: Duration,
    ) -> Result<JobResult, BatchError> {
        let mut guard = manifest.lock().await;
        let batch_id = guard.batch_id.clone();
        let job = guard
            .find_job_mut(job_id)
            .ok_or_else(|| unknown_job(&batch_id, job_id))?;

        if job.status != JobStatus::Running {
            // Changed by a manual override while the executor was busy.
            warn!(
                "Job {} is {} after execution, discarding executor result",
                job_id, job.status
            );
        } else {
            match &verdict {
                JobVerdict::Succeeded(artifacts) => job.mark_succeeded(artifacts.iter().cloned())?,
                JobVerdict::Failed(message) => job.mark_failed(failure_message(message))?,
                JobVerdict::TimedOut(limit) => {
                    job.mark_failed(format!("job timed out after {:?}", limit))?
                }
                JobVerdict::Panicked(message) => job.mark_failed(format!(
                    "executor panicked: {}",
                    sanitize_error(message)
                ))?,
            }
        }

        let result = JobResult {
            job_id: job.job_id.clone(),
            row_index: job.row_index,
            status: job.status,
            attempts: job.attempts,
            error_message: job.error_message.clone(),
            duration_ms: elapsed.as_millis() as u64,
        };
        self.store.save_manifest(&mut guard)?;
        drop(guard);

        metrics::emit(
            &self.metrics,
            events::JOB_COMPLETED,
            &[("outcome", verdict.outcome())],
            elapsed.as_secs_f64(),
        );

        match result.status {
            JobStatus::Success => debug!(
                batch_id = %batch_id,
                job_id = %job_id,
                duration_ms = result.duration_ms,
                "Job succeeded"
            ),
            JobStatus::Failed => warn!(
                "Job {} failed (attempt {}): {}",
                job_id,
                result.attempts,
                result.error_message.as_deref().unwrap_or("")
            ),
            _ => {}
        }

        Ok(result)
    }
}

/// Resets jobs a crashed run left `running` or `retrying`. Attempts are kept.
pub(crate) fn recover_interrupted(manifest: &mut Manifest) -> usize {
    let mut recovered = 0;
    for job in &mut manifest.jobs {
        if matches!(job.status, JobStatus::Running | JobStatus::Retrying) {
            job.reset_to_pending();
            recovered += 1;
        }
    }
    recovered
}

fn verdict_from_outcome(outcome: ExecutionOutcome) -> JobVerdict {
    if outcome.success {
        JobVerdict::Succeeded(outcome.artifacts)
    } else {
        JobVerdict::Failed(outcome.error.unwrap_or_default())
    }
}

fn failure_message(raw: &str) -> String {
    let clean = sanitize_error(raw);
    if clean.is_empty() {
        "executor reported failure".to_string()
    } else {
        clean
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn unknown_job(batch_id: &str, job_id: &str) -> BatchError {
    BatchError::Engine(format!("job {} not found in batch {}", job_id, batch_id))
}
