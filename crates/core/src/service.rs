//! Operation surface for CLI-style front ends.
//!
//! [`BatchService`] ties the parser, store, orchestrator, retry handler and
//! exporters together behind one call per operation. Each call returns a
//! structured result or a typed [`BatchError`]; exit codes are the caller's
//! business.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::artifacts::{add_row_artifact, export_failed_rows, export_failure_report};
use crate::config::{validate_config, EngineConfig};
use crate::context::RunContext;
use crate::csv_input::{parse_csv, CsvSource};
use crate::error::BatchError;
use crate::executor::JobExecutor;
use crate::metrics::MetricsSink;
use crate::model::{
    create_batch_jobs, generate_batch_id, validate_batch_id, BatchSummary, Job, JobStatus,
    Manifest,
};
use crate::orchestrator::{BatchOrchestrator, ExecutionReport, OrchestratorConfig, StopFlag};
use crate::paths;
use crate::retry::{BackoffPolicy, RetryHandler, RetryReport};
use crate::store::{ManifestStore, SharedManifest};

/// Batch operations over one run context.
pub struct BatchService {
    config: EngineConfig,
    store: Arc<ManifestStore>,
    orchestrator: BatchOrchestrator,
    retry: RetryHandler,
    /// Manifests opened by this service, one shared copy per batch.
    manifests: Mutex<HashMap<String, SharedManifest>>,
    /// Stop flags of batches with an `execute` or `retry` in progress.
    active: Mutex<HashMap<String, StopFlag>>,
}

impl BatchService {
    /// Creates a service writing new batches into `context`.
    pub fn new(
        config: EngineConfig,
        context: RunContext,
        executor: Arc<dyn JobExecutor>,
    ) -> Result<Self, BatchError> {
        validate_config(&config)?;

        let store = Arc::new(ManifestStore::new(context));
        let orchestrator = BatchOrchestrator::new(
            OrchestratorConfig::from(&config.execution),
            Arc::clone(&store),
            executor,
        );
        let retry = RetryHandler::new(orchestrator.clone(), BackoffPolicy::from(&config.retry));

        Ok(Self {
            config,
            store,
            orchestrator,
            retry,
            manifests: Mutex::new(HashMap::new()),
            active: Mutex::new(HashMap::new()),
        })
    }

    /// Creates a service with a fresh run under the configured artifact root.
    pub fn from_config(
        config: EngineConfig,
        executor: Arc<dyn JobExecutor>,
    ) -> Result<Self, BatchError> {
        let context = RunContext::new(config.storage.artifact_root.clone());
        Self::new(config, context, executor)
    }

    /// Reports job and retry metrics to `sink`.
    pub fn with_metrics(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.orchestrator = self.orchestrator.with_metrics(sink);
        self.retry = RetryHandler::new(self.orchestrator.clone(), *self.retry.policy());
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn context(&self) -> &RunContext {
        self.store.context()
    }

    pub fn store(&self) -> &Arc<ManifestStore> {
        &self.store
    }

    /// Parses `source` and persists a new batch with a generated id.
    pub fn start(&self, source: CsvSource) -> Result<Manifest, BatchError> {
        self.start_with_batch_id(source, &generate_batch_id())
    }

    /// Parses `source` and persists a new batch under `batch_id`.
    ///
    /// Nothing is written when parsing fails.
    pub fn start_with_batch_id(
        &self,
        source: CsvSource,
        batch_id: &str,
    ) -> Result<Manifest, BatchError> {
        validate_batch_id(batch_id)?;
        let table = parse_csv(source, &self.config.csv)?;

        let mut manifest = create_batch_jobs(table.rows, batch_id, self.context().run_id())?;
        manifest.columns = table.columns;
        manifest.source_csv = table
            .source_path
            .map(|p| paths::to_portable(self.context().artifact_root(), &p));

        self.store.create_manifest(&mut manifest)?;
        self.lock_manifests().insert(
            batch_id.to_string(),
            Arc::new(tokio::sync::Mutex::new(manifest.clone())),
        );

        info!(
            "Started batch {} with {} job(s) in run {}",
            batch_id,
            manifest.total_jobs,
            manifest.run_id
        );
        Ok(manifest)
    }

    /// Counts from the last persisted manifest.
    pub fn status(&self, batch_id: &str) -> Result<BatchSummary, BatchError> {
        Ok(self.store.load_manifest(batch_id)?.summary())
    }

    /// The last persisted manifest.
    pub fn manifest(&self, batch_id: &str) -> Result<Manifest, BatchError> {
        self.store.load_manifest(batch_id)
    }

    /// Manually sets a job's status. Only `pending`, `success` and `failed`
    /// are accepted.
    pub async fn update_job(
        &self,
        batch_id: &str,
        job_id: &str,
        status: JobStatus,
    ) -> Result<Job, BatchError> {
        let shared = self.open(batch_id)?;
        let mut manifest = shared.lock().await;
        let job = manifest
            .find_job_mut(job_id)
            .ok_or_else(|| unknown_job(batch_id, job_id))?;
        let previous = job.status;
        job.override_status(status)?;
        let updated = job.clone();
        self.store.save_manifest(&mut manifest)?;

        info!(
            "Job {} in batch {} manually set {} -> {}",
            job_id, batch_id, previous, status
        );
        Ok(updated)
    }

    /// Runs every pending job of the batch.
    pub async fn execute(&self, batch_id: &str) -> Result<ExecutionReport, BatchError> {
        let shared = self.open(batch_id)?;
        let stop = self.begin_run(batch_id)?;
        let result = self.orchestrator.execute_batch_jobs(&shared, &stop).await;
        self.end_run(batch_id);
        result
    }

    /// Retries failed jobs, all eligible ones or just `job_ids`.
    pub async fn retry(
        &self,
        batch_id: &str,
        job_ids: Option<&[String]>,
    ) -> Result<RetryReport, BatchError> {
        let shared = self.open(batch_id)?;
        let stop = self.begin_run(batch_id)?;
        let result = self
            .retry
            .retry_batch_jobs(&shared, job_ids, self.config.retry.max_retries, &stop)
            .await;
        self.end_run(batch_id);
        result
    }

    /// Signals the active run of `batch_id` to stop dispatching.
    ///
    /// Returns immediately. `false` when nothing was running.
    pub fn stop(&self, batch_id: &str) -> bool {
        match self.lock_active().get(batch_id) {
            Some(flag) => {
                flag.stop();
                info!("Stop requested for batch {}", batch_id);
                true
            }
            None => {
                warn!("Stop requested for batch {} but it is not running", batch_id);
                false
            }
        }
    }

    /// Whether an `execute` or `retry` is in progress for `batch_id`.
    pub fn is_running(&self, batch_id: &str) -> bool {
        self.lock_active().contains_key(batch_id)
    }

    /// Links an artifact to a job. Unknown jobs are logged and ignored.
    pub async fn add_artifact(
        &self,
        batch_id: &str,
        job_id: &str,
        artifact_ref: &str,
    ) -> Result<bool, BatchError> {
        let shared = self.open(batch_id)?;
        let mut manifest = shared.lock().await;
        let added = add_row_artifact(&mut manifest, job_id, artifact_ref);
        if added {
            self.store.save_manifest(&mut manifest)?;
        }
        Ok(added)
    }

    /// Exports failed rows for resubmission. Returns the row count.
    pub async fn export_failed(&self, batch_id: &str, destination: &Path) -> Result<usize, BatchError> {
        let shared = self.open(batch_id)?;
        let manifest = shared.lock().await;
        export_failed_rows(&manifest, destination)
    }

    /// Exports the failure report. Returns the row count.
    pub async fn export_report(&self, batch_id: &str, destination: &Path) -> Result<usize, BatchError> {
        let shared = self.open(batch_id)?;
        let manifest = shared.lock().await;
        export_failure_report(&manifest, destination)
    }

    /// Every batch id under the artifact root.
    pub fn list_batches(&self) -> Result<Vec<String>, BatchError> {
        self.store.list_batches()
    }

    /// Returns the shared manifest for `batch_id`, loading it on first use.
    fn open(&self, batch_id: &str) -> Result<SharedManifest, BatchError> {
        if let Some(shared) = self.lock_manifests().get(batch_id) {
            return Ok(Arc::clone(shared));
        }

        let loaded = self.store.load_shared(batch_id)?;
        let mut manifests = self.lock_manifests();
        // Another caller may have loaded it meanwhile; keep the first copy.
        Ok(Arc::clone(
            manifests.entry(batch_id.to_string()).or_insert(loaded),
        ))
    }

    fn begin_run(&self, batch_id: &str) -> Result<StopFlag, BatchError> {
        let mut active = self.lock_active();
        if active.contains_key(batch_id) {
            return Err(BatchError::Engine(format!(
                "batch {} is already running",
                batch_id
            )));
        }
        let flag = StopFlag::new();
        active.insert(batch_id.to_string(), flag.clone());
        Ok(flag)
    }

    fn end_run(&self, batch_id: &str) {
        self.lock_active().remove(batch_id);
    }

    fn lock_manifests(&self) -> std::sync::MutexGuard<'_, HashMap<String, SharedManifest>> {
        self.manifests.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, HashMap<String, StopFlag>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn unknown_job(batch_id: &str, job_id: &str) -> BatchError {
    BatchError::Configuration(format!("job {} not found in batch {}", job_id, batch_id))
}
