//! Mock job executor for testing.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::executor::{ExecutionOutcome, JobExecutor};
use crate::model::JobParams;

/// What the mock does for rows matching a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockBehavior {
    /// Return a failed outcome with this message.
    Fail(String),
    /// Never return; the orchestrator's timeout has to fire.
    Hang,
    /// Panic inside `execute`.
    Panic,
}

#[derive(Debug, Clone)]
struct Rule {
    column: String,
    value: String,
    behavior: MockBehavior,
    /// Remaining matches this rule applies to. `None` = unlimited.
    remaining: Option<u32>,
}

impl Rule {
    fn matches(&self, params: &JobParams) -> bool {
        self.remaining != Some(0) && params.get(&self.column) == Some(self.value.as_str())
    }
}

/// Mock implementation of the JobExecutor trait.
///
/// Succeeds by default. Rows are matched by a column value:
/// - `fail_when` / `fail_times` for scripted failures
/// - `hang_when` to exercise timeouts
/// - `panic_when` to exercise panic containment
///
/// Every call is recorded, and the highest number of simultaneous calls is
/// tracked for concurrency assertions.
///
/// # Example
///
/// ```rust,ignore
/// use rowbatch_core::testing::MockExecutor;
///
/// let executor = MockExecutor::new();
/// executor.fail_when("id", "2", "element not found").await;
///
/// // Run a batch...
///
/// assert_eq!(executor.call_count().await, 3);
/// assert!(executor.max_concurrent() <= 2);
/// ```
#[derive(Debug)]
pub struct MockExecutor {
    /// Parameters of every call, in call order.
    calls: Arc<RwLock<Vec<JobParams>>>,
    /// Scripted behaviors, first match wins.
    rules: Arc<RwLock<Vec<Rule>>>,
    /// Simulated work duration.
    delay: Arc<RwLock<Duration>>,
    /// Artifact references returned on success.
    artifacts: Arc<RwLock<Vec<String>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl Default for MockExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl MockExecutor {
    /// Create a new mock executor that succeeds immediately.
    pub fn new() -> Self {
        Self {
            calls: Arc::new(RwLock::new(Vec::new())),
            rules: Arc::new(RwLock::new(Vec::new())),
            delay: Arc::new(RwLock::new(Duration::ZERO)),
            artifacts: Arc::new(RwLock::new(Vec::new())),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Fail every row whose `column` equals `value`.
    pub async fn fail_when(&self, column: &str, value: &str, message: &str) {
        self.add_rule(column, value, MockBehavior::Fail(message.to_string()), None)
            .await;
    }

    /// Fail the next `times` matching rows, then succeed.
    pub async fn fail_times(&self, column: &str, value: &str, times: u32, message: &str) {
        self.add_rule(
            column,
            value,
            MockBehavior::Fail(message.to_string()),
            Some(times),
        )
        .await;
    }

    /// Never return for matching rows.
    pub async fn hang_when(&self, column: &str, value: &str) {
        self.add_rule(column, value, MockBehavior::Hang, None).await;
    }

    /// Panic for matching rows.
    pub async fn panic_when(&self, column: &str, value: &str) {
        self.add_rule(column, value, MockBehavior::Panic, None).await;
    }

    /// Drop every scripted behavior.
    pub async fn clear_rules(&self) {
        self.rules.write().await.clear();
    }

    /// Set the simulated work duration.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = delay;
    }

    /// Set the artifact references returned by successful calls.
    pub async fn set_artifacts(&self, artifacts: Vec<String>) {
        *self.artifacts.write().await = artifacts;
    }

    /// Get the parameters of every call.
    pub async fn calls(&self) -> Vec<JobParams> {
        self.calls.read().await.clone()
    }

    /// Get the number of calls made.
    pub async fn call_count(&self) -> usize {
        self.calls.read().await.len()
    }

    /// Number of calls for rows whose `column` equals `value`.
    pub async fn calls_for(&self, column: &str, value: &str) -> usize {
        self.calls
            .read()
            .await
            .iter()
            .filter(|p| p.get(column) == Some(value))
            .count()
    }

    /// Highest number of calls that were in progress at the same time.
    pub fn max_concurrent(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn add_rule(&self, column: &str, value: &str, behavior: MockBehavior, remaining: Option<u32>) {
        self.rules.write().await.push(Rule {
            column: column.to_string(),
            value: value.to_string(),
            behavior,
            remaining,
        });
    }

    /// Find the behavior for `params`, consuming one use of a limited rule.
    async fn take_behavior(&self, params: &JobParams) -> Option<MockBehavior> {
        let mut rules = self.rules.write().await;
        let rule = rules.iter_mut().find(|r| r.matches(params))?;
        if let Some(remaining) = rule.remaining.as_mut() {
            *remaining -= 1;
        }
        Some(rule.behavior.clone())
    }
}

/// Decrements the in-flight count even when the call is aborted or panics.
struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl JobExecutor for MockExecutor {
    async fn execute(&self, params: &JobParams) -> ExecutionOutcome {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlightGuard(Arc::clone(&self.in_flight));

        self.calls.write().await.push(params.clone());
        let behavior = self.take_behavior(params).await;

        let delay = *self.delay.read().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match behavior {
            Some(MockBehavior::Fail(message)) => ExecutionOutcome::failure(message),
            Some(MockBehavior::Hang) => std::future::pending().await,
            Some(MockBehavior::Panic) => panic!("mock executor panic"),
            None => {
                ExecutionOutcome::success().with_artifacts(self.artifacts.read().await.clone())
            }
        }
    }
}
