//! Metrics emission for the batch engine.
//!
//! The engine reports through the narrow [`MetricsSink`] interface. Hosts that
//! scrape Prometheus plug in [`PrometheusMetrics`] and register
//! [`all_metrics`] in their registry; hosts without metrics pass no sink.

use std::sync::Arc;

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};
use tracing::debug;

/// Event names emitted by the engine.
pub mod events {
    /// A job finished. Labels: `outcome`. Value: duration in seconds.
    pub const JOB_COMPLETED: &str = "job_completed";
    /// A failed job was re-dispatched. Value: 1.
    pub const JOB_RETRIED: &str = "job_retried";
    /// A batch execution started. Value: number of jobs to dispatch.
    pub const BATCH_STARTED: &str = "batch_started";
}

/// Narrow emit interface for an external metrics collaborator.
pub trait MetricsSink: Send + Sync {
    fn record(&self, event: &str, labels: &[(&str, &str)], value: f64);
}

/// Shared handle to an optional sink.
pub type SharedMetrics = Option<Arc<dyn MetricsSink>>;

/// Records into `sink` when one is configured.
pub(crate) fn emit(sink: &SharedMetrics, event: &str, labels: &[(&str, &str)], value: f64) {
    if let Some(sink) = sink {
        sink.record(event, labels, value);
    }
}

// =============================================================================
// Prometheus
// =============================================================================

/// Jobs finished, by outcome.
pub static JOBS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("rowbatch_jobs_total", "Total jobs finished"),
        &["outcome"], // "success", "failed", "timeout"
    )
    .expect("rowbatch_jobs_total is a valid metric")
});

/// Job duration in seconds, by outcome.
pub static JOB_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("rowbatch_job_duration_seconds", "Duration of a single job")
            .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]),
        &["outcome"],
    )
    .expect("rowbatch_job_duration_seconds is a valid metric")
});

/// Retry dispatches.
pub static RETRIES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("rowbatch_retries_total", "Total retry dispatches")
        .expect("rowbatch_retries_total is a valid metric")
});

/// Batch executions started.
pub static BATCHES_STARTED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("rowbatch_batches_started_total", "Total batch executions started")
        .expect("rowbatch_batches_started_total is a valid metric")
});

/// Get all engine metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(JOBS_TOTAL.clone()),
        Box::new(JOB_DURATION.clone()),
        Box::new(RETRIES_TOTAL.clone()),
        Box::new(BATCHES_STARTED.clone()),
    ]
}

/// [`MetricsSink`] backed by the process-wide Prometheus collectors.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrometheusMetrics;

impl PrometheusMetrics {
    pub fn new() -> Self {
        Self
    }
}

impl MetricsSink for PrometheusMetrics {
    fn record(&self, event: &str, labels: &[(&str, &str)], value: f64) {
        let outcome = labels
            .iter()
            .find(|(k, _)| *k == "outcome")
            .map(|(_, v)| *v)
            .unwrap_or("unknown");

        match event {
            events::JOB_COMPLETED => {
                JOBS_TOTAL.with_label_values(&[outcome]).inc();
                JOB_DURATION.with_label_values(&[outcome]).observe(value);
            }
            events::JOB_RETRIED => RETRIES_TOTAL.inc(),
            events::BATCH_STARTED => BATCHES_STARTED.inc(),
            other => debug!(event = %other, "Ignoring unknown metrics event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_metrics_register() {
        let registry = prometheus::Registry::new();
        for metric in all_metrics() {
            registry.register(metric).unwrap();
        }
        assert!(!registry.gather().is_empty());
    }

    #[test]
    fn test_prometheus_sink_counts_jobs() {
        let sink = PrometheusMetrics::new();
        let before = JOBS_TOTAL.with_label_values(&["success"]).get();
        sink.record(events::JOB_COMPLETED, &[("outcome", "success")], 0.25);
        sink.record("something_else", &[], 1.0);
        assert!(JOBS_TOTAL.with_label_values(&["success"]).get() > before);
    }

    #[test]
    fn test_emit_without_sink_is_noop() {
        emit(&None, events::BATCH_STARTED, &[], 3.0);
    }
}
