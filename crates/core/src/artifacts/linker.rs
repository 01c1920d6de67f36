//! Per-row artifact linkage.

use tracing::{debug, warn};

use crate::model::Manifest;

/// Records `artifact_ref` on the job with `job_id`.
///
/// Artifact capture is best effort: an unknown job id or an empty reference is
/// logged and ignored. Returns `true` when the reference was newly added.
pub fn add_row_artifact(manifest: &mut Manifest, job_id: &str, artifact_ref: &str) -> bool {
    let artifact_ref = artifact_ref.trim();
    if artifact_ref.is_empty() {
        warn!(
            batch_id = %manifest.batch_id,
            job_id = %job_id,
            "Ignoring empty artifact reference"
        );
        return false;
    }

    let batch_id = manifest.batch_id.clone();
    match manifest.find_job_mut(job_id) {
        Some(job) => {
            let added = job.add_artifact(artifact_ref);
            debug!(
                batch_id = %batch_id,
                job_id = %job_id,
                artifact = %artifact_ref,
                added,
                "Linked artifact"
            );
            added
        }
        None => {
            warn!(
                "Artifact {} references unknown job {} in batch {}",
                artifact_ref, job_id, batch_id
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::create_batch_jobs;
    use crate::testing::fixtures;

    #[test]
    fn test_links_artifact_once() {
        let mut manifest = create_batch_jobs(fixtures::rows(2), "b", "r").unwrap();
        assert!(add_row_artifact(&mut manifest, "b-0001", "shots/2.png"));
        assert!(!add_row_artifact(&mut manifest, "b-0001", "shots/2.png"));
        assert_eq!(manifest.jobs[1].artifact_refs.len(), 1);
        assert!(manifest.jobs[0].artifact_refs.is_empty());
    }

    #[test]
    fn test_unknown_job_is_ignored() {
        let mut manifest = create_batch_jobs(fixtures::rows(1), "b", "r").unwrap();
        let before = manifest.clone();
        assert!(!add_row_artifact(&mut manifest, "b-0042", "x.png"));
        assert_eq!(manifest, before);
    }

    #[test]
    fn test_empty_reference_is_ignored() {
        let mut manifest = create_batch_jobs(fixtures::rows(1), "b", "r").unwrap();
        assert!(!add_row_artifact(&mut manifest, "b-0000", "   "));
        assert!(manifest.jobs[0].artifact_refs.is_empty());
    }
}
