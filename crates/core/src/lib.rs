pub mod artifacts;
pub mod config;
pub mod context;
pub mod csv_input;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod model;
pub mod orchestrator;
pub mod paths;
pub mod retry;
pub mod sanitize;
pub mod service;
pub mod store;
pub mod testing;

pub use artifacts::{add_row_artifact, export_failed_rows, export_failure_report};
pub use config::{load_config, load_config_from_str, validate_config, ConfigError, EngineConfig};
pub use context::RunContext;
pub use csv_input::{parse_csv, CsvSource, CsvTable};
pub use error::BatchError;
pub use executor::{ExecutionOutcome, JobExecutor};
pub use metrics::{MetricsSink, PrometheusMetrics};
pub use model::{create_batch_jobs, BatchSummary, Job, JobParams, JobStatus, Manifest};
pub use orchestrator::{BatchOrchestrator, ExecutionReport, JobResult, OrchestratorConfig, StopFlag};
pub use retry::{BackoffPolicy, RetryHandler, RetryReport};
pub use service::BatchService;
pub use store::{ManifestStore, SharedManifest};
