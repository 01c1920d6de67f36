//! Job and manifest data model.

mod ids;
mod job;
mod manifest;
mod params;

pub use ids::{generate_batch_id, validate_batch_id, validate_identifier};
pub use job::{job_id_for, Job, JobStatus};
pub use manifest::{create_batch_jobs, BatchSummary, Manifest};
pub use params::JobParams;
