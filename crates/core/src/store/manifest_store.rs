use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use super::index::ManifestIndex;
use crate::context::RunContext;
use crate::error::BatchError;
use crate::model::{validate_batch_id, Job, Manifest};

/// A manifest shared between the tasks working on one batch.
pub type SharedManifest = Arc<tokio::sync::Mutex<Manifest>>;

/// JSON manifest store rooted at a run context.
pub struct ManifestStore {
    context: RunContext,
    index: RwLock<Option<ManifestIndex>>,
    write_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ManifestStore {
    pub fn new(context: RunContext) -> Self {
        Self {
            context,
            index: RwLock::new(None),
            write_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn context(&self) -> &RunContext {
        &self.context
    }

    /// Persists a new manifest in the current run.
    ///
    /// Fails with `Engine` if the batch id already exists anywhere under the
    /// artifact root.
    pub fn create_manifest(&self, manifest: &mut Manifest) -> Result<PathBuf, BatchError> {
        validate_batch_id(&manifest.batch_id)?;
        if let Some(existing) = self.find_existing(&manifest.batch_id)? {
            return Err(BatchError::Engine(format!(
                "batch {} already exists at {}",
                manifest.batch_id,
                existing.display()
            )));
        }

        let path = self.context.manifest_path(&manifest.batch_id);
        self.write_manifest(manifest, &path)?;
        info!(
            batch_id = %manifest.batch_id,
            run_id = %manifest.run_id,
            jobs = manifest.total_jobs,
            path = %path.display(),
            "Created manifest"
        );
        Ok(path)
    }

    /// Recomputes counters and atomically rewrites the manifest.
    ///
    /// Manifests are rewritten where they were found; unknown batches go to
    /// the current run.
    pub fn save_manifest(&self, manifest: &mut Manifest) -> Result<PathBuf, BatchError> {
        validate_batch_id(&manifest.batch_id)?;
        let path = match self.find_existing(&manifest.batch_id)? {
            Some(path) => path,
            None => self.context.manifest_path(&manifest.batch_id),
        };
        self.write_manifest(manifest, &path)?;
        Ok(path)
    }

    /// Loads a manifest by batch id.
    pub fn load_manifest(&self, batch_id: &str) -> Result<Manifest, BatchError> {
        let path = self.locate(batch_id)?;
        let content = fs::read_to_string(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                BatchError::Configuration(format!("manifest not found for batch {}", batch_id))
            }
            _ => BatchError::io(&path, e),
        })?;

        let mut manifest: Manifest = serde_json::from_str(&content).map_err(|e| {
            BatchError::FileProcessing(format!("malformed manifest {}: {}", path.display(), e))
        })?;

        if manifest.batch_id != batch_id {
            return Err(BatchError::Engine(format!(
                "manifest at {} belongs to batch {}, expected {}",
                path.display(),
                manifest.batch_id,
                batch_id
            )));
        }

        let stored = (
            manifest.total_jobs,
            manifest.completed_jobs,
            manifest.failed_jobs,
        );
        manifest.recompute_counters();
        if stored
            != (
                manifest.total_jobs,
                manifest.completed_jobs,
                manifest.failed_jobs,
            )
        {
            warn!(batch_id = %batch_id, "Stored counters drifted from job statuses, recomputed");
        }
        manifest.validate()?;

        debug!(batch_id = %batch_id, path = %path.display(), "Loaded manifest");
        Ok(manifest)
    }

    /// Loads a manifest and wraps it for shared mutation.
    pub fn load_shared(&self, batch_id: &str) -> Result<SharedManifest, BatchError> {
        Ok(Arc::new(tokio::sync::Mutex::new(self.load_manifest(batch_id)?)))
    }

    /// Returns the job with `job_id`, if any.
    pub fn find_job<'a>(manifest: &'a Manifest, job_id: &str) -> Option<&'a Job> {
        manifest.find_job(job_id)
    }

    /// Finds the manifest file for `batch_id`.
    ///
    /// Checks the current run, then the index, then rebuilds the index once.
    pub fn locate(&self, batch_id: &str) -> Result<PathBuf, BatchError> {
        self.find_existing(batch_id)?.ok_or_else(|| {
            BatchError::Configuration(format!(
                "no manifest found for batch {} under {}",
                batch_id,
                self.context.artifact_root().display()
            ))
        })
    }

    /// Like `locate`, but a missing batch is `None`. Scan failures are errors.
    fn find_existing(&self, batch_id: &str) -> Result<Option<PathBuf>, BatchError> {
        validate_batch_id(batch_id)?;

        let current = self.context.manifest_path(batch_id);
        if current.is_file() {
            return Ok(Some(current));
        }

        let root = self.context.artifact_root();
        if let Some(path) = self.lookup_index(root, batch_id) {
            if path.is_file() {
                return Ok(Some(path));
            }
        }

        let rebuilt = ManifestIndex::rebuild(root)?;
        let found = rebuilt.get(root, batch_id);
        *self.index.write().unwrap_or_else(|e| e.into_inner()) = Some(rebuilt);

        Ok(found.filter(|path| path.is_file()))
    }

    /// Every batch id under the artifact root, sorted.
    pub fn list_batches(&self) -> Result<Vec<String>, BatchError> {
        let rebuilt = ManifestIndex::rebuild(self.context.artifact_root())?;
        let ids = rebuilt.batch_ids();
        *self.index.write().unwrap_or_else(|e| e.into_inner()) = Some(rebuilt);
        Ok(ids)
    }

    fn lookup_index(&self, root: &Path, batch_id: &str) -> Option<PathBuf> {
        let guard = self.index.read().unwrap_or_else(|e| e.into_inner());
        guard.as_ref().and_then(|index| index.get(root, batch_id))
    }

    fn write_lock(&self, batch_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.write_locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(batch_id.to_string()).or_default())
    }

    /// Serializes and atomically replaces `path`, one writer per batch id.
    fn write_manifest(&self, manifest: &mut Manifest, path: &Path) -> Result<(), BatchError> {
        let lock = self.write_lock(&manifest.batch_id);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        manifest.recompute_counters();
        manifest.validate()?;
        manifest.updated_at = Some(Utc::now());

        let json = serde_json::to_vec_pretty(manifest)
            .map_err(|e| BatchError::Engine(format!("failed to serialize manifest: {}", e)))?;

        let dir = path
            .parent()
            .ok_or_else(|| BatchError::Engine(format!("invalid manifest path {}", path.display())))?;
        fs::create_dir_all(dir).map_err(|e| BatchError::io(dir, e))?;

        let mut temp = NamedTempFile::new_in(dir).map_err(|e| BatchError::io(dir, e))?;
        temp.write_all(&json)
            .and_then(|_| temp.as_file().sync_all())
            .map_err(|e| BatchError::io(temp.path(), e))?;
        temp.persist(path)
            .map_err(|e| BatchError::io(path, e.error))?;

        let mut index = self.index.write().unwrap_or_else(|e| e.into_inner());
        index
            .get_or_insert_with(ManifestIndex::new)
            .insert(self.context.artifact_root(), &manifest.batch_id, path);

        debug!(
            batch_id = %manifest.batch_id,
            completed = manifest.completed_jobs,
            failed = manifest.failed_jobs,
            total = manifest.total_jobs,
            "Saved manifest"
        );
        Ok(())
    }
}
