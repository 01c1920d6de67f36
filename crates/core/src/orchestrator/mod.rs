//! Concurrency-bounded batch execution.
//!
//! The orchestrator dispatches `pending` jobs in row order, at most
//! `max_concurrency` at a time, each under a per-job timeout. Every status
//! change is persisted through the manifest store before the next one, so a
//! crashed run can be resumed by executing the batch again.

mod config;
mod runner;
mod types;

pub use config::OrchestratorConfig;
pub use runner::BatchOrchestrator;
pub use types::{ExecutionReport, JobResult, StopFlag};
