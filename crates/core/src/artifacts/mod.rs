//! Artifact linkage and failure exports.

mod export;
mod linker;

pub use export::{export_failed_rows, export_failure_report};
pub use linker::add_row_artifact;
