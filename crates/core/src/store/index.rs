//! batch_id → manifest path index over the run-artifact tree.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::context::MANIFEST_FILE_NAME;
use crate::error::BatchError;
use crate::paths;

/// Index of every manifest below an artifact root.
///
/// Paths are kept in portable form relative to the root.
#[derive(Debug, Clone, Default)]
pub struct ManifestIndex {
    entries: HashMap<String, String>,
}

impl ManifestIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scans `<root>/runs/*/batches/*/manifest.json`.
    ///
    /// Runs are visited in name order, so when a batch id appears in several
    /// runs the latest run wins.
    pub fn rebuild(root: &Path) -> Result<Self, BatchError> {
        let mut index = Self::new();
        let runs_dir = root.join("runs");
        if !runs_dir.is_dir() {
            return Ok(index);
        }

        for run_dir in sorted_subdirs(&runs_dir)? {
            let batches_dir = run_dir.join("batches");
            if !batches_dir.is_dir() {
                continue;
            }
            for batch_dir in sorted_subdirs(&batches_dir)? {
                let manifest = batch_dir.join(MANIFEST_FILE_NAME);
                if !manifest.is_file() {
                    continue;
                }
                let Some(batch_id) = batch_dir.file_name().map(|n| n.to_string_lossy().into_owned())
                else {
                    continue;
                };
                if let Some(previous) = index.entries.get(&batch_id) {
                    debug!(batch_id = %batch_id, previous = %previous, "Batch id found in several runs");
                }
                index.insert(root, &batch_id, &manifest);
            }
        }

        debug!(root = %root.display(), batches = index.len(), "Rebuilt manifest index");
        Ok(index)
    }

    pub fn insert(&mut self, root: &Path, batch_id: &str, path: &Path) {
        self.entries
            .insert(batch_id.to_string(), paths::to_portable(root, path));
    }

    /// Resolves the indexed path for `batch_id` against `root`.
    pub fn get(&self, root: &Path, batch_id: &str) -> Option<PathBuf> {
        let portable = self.entries.get(batch_id)?;
        match paths::from_portable(root, portable) {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(batch_id = %batch_id, error = %e, "Ignoring unsafe index entry");
                None
            }
        }
    }

    /// Indexed batch ids, sorted.
    pub fn batch_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn sorted_subdirs(dir: &Path) -> Result<Vec<PathBuf>, BatchError> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| BatchError::io(dir, e))? {
        let entry = entry.map_err(|e| BatchError::io(dir, e))?;
        let path = entry.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}
