//! Metrics sink that records every event for assertions.

use std::sync::Mutex;

use crate::metrics::MetricsSink;

/// A recorded metrics event.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    pub event: String,
    pub labels: Vec<(String, String)>,
    pub value: f64,
}

/// In-memory [`MetricsSink`].
#[derive(Debug, Default)]
pub struct RecordingMetrics {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded events.
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of events named `event`.
    pub fn count(&self, event: &str) -> usize {
        self.events().iter().filter(|e| e.event == event).count()
    }

    /// Number of events named `event` carrying `key=value`.
    pub fn count_with_label(&self, event: &str, key: &str, value: &str) -> usize {
        self.events()
            .iter()
            .filter(|e| e.event == event)
            .filter(|e| e.labels.iter().any(|(k, v)| k == key && v == value))
            .count()
    }
}

impl MetricsSink for RecordingMetrics {
    fn record(&self, event: &str, labels: &[(&str, &str)], value: f64) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RecordedEvent {
                event: event.to_string(),
                labels: labels
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                value,
            });
    }
}
