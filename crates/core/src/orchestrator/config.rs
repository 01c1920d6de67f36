//! Orchestrator configuration.

use std::time::Duration;

use crate::config::ExecutionConfig;

/// Dispatch limits for one orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Maximum jobs running at the same time. Clamped to at least 1.
    pub max_concurrency: usize,
    /// Wall-clock limit for a single executor call.
    pub job_timeout: Duration,
}

impl OrchestratorConfig {
    pub fn new(max_concurrency: usize, job_timeout: Duration) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
            job_timeout,
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        ExecutionConfig::default().into()
    }
}

impl From<&ExecutionConfig> for OrchestratorConfig {
    fn from(config: &ExecutionConfig) -> Self {
        Self::new(config.max_concurrency, config.job_timeout())
    }
}

impl From<ExecutionConfig> for OrchestratorConfig {
    fn from(config: ExecutionConfig) -> Self {
        Self::from(&config)
    }
}
