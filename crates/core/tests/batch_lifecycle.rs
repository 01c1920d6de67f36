//! Batch lifecycle integration tests.
//!
//! These tests drive batches end to end through the service surface:
//! CSV -> manifest -> execute -> retry -> export

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use rowbatch_core::{
    create_batch_jobs, parse_csv,
    testing::{fixtures, MockExecutor},
    BatchError, BatchService, CsvSource, EngineConfig, JobExecutor, JobStatus, ManifestStore,
    RunContext,
};

/// Test helper holding an artifact root, an input directory and a mock executor.
struct TestHarness {
    executor: Arc<MockExecutor>,
    config: EngineConfig,
    _temp_dir: TempDir,
    input_dir: std::path::PathBuf,
}

impl TestHarness {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let input_dir = temp_dir.path().join("input");
        std::fs::create_dir_all(&input_dir).expect("Failed to create input dir");
        let config = fixtures::engine_config(&temp_dir.path().join("artifacts"));

        Self {
            executor: Arc::new(MockExecutor::new()),
            config,
            _temp_dir: temp_dir,
            input_dir,
        }
    }

    /// A service in its own run, sharing the artifact root with every other run.
    fn service(&self, run_id: &str) -> BatchService {
        let context = RunContext::with_run_id(&self.config.storage.artifact_root, run_id)
            .expect("Failed to create run context");
        BatchService::new(
            self.config.clone(),
            context,
            Arc::clone(&self.executor) as Arc<dyn JobExecutor>,
        )
        .expect("Failed to create service")
    }

    fn csv(&self, name: &str, rows: usize) -> CsvSource {
        let path = fixtures::write_csv(&self.input_dir, name, &fixtures::csv_text(rows))
            .expect("Failed to write CSV");
        CsvSource::path(path)
    }
}

#[test]
fn test_job_ids_are_deterministic() {
    let harness = TestHarness::new();
    let first = parse_csv(harness.csv("a.csv", 4), &harness.config.csv).unwrap();
    let second = parse_csv(harness.csv("a.csv", 4), &harness.config.csv).unwrap();

    let a = create_batch_jobs(first.rows, "batch-det", "run-1").unwrap();
    let b = create_batch_jobs(second.rows, "batch-det", "run-2").unwrap();

    let ids = |m: &rowbatch_core::Manifest| m.jobs.iter().map(|j| j.job_id.clone()).collect::<Vec<_>>();
    assert_eq!(ids(&a), ids(&b));
    assert_eq!(ids(&a)[3], "batch-det-0003");
}

#[tokio::test]
async fn test_scenario_one_failure_then_export() {
    let harness = TestHarness::new();
    harness.executor.fail_when("id", "2", "checkout button missing").await;
    let svc = harness.service("run-1");
    let batch = svc.start_with_batch_id(harness.csv("orders.csv", 3), "batch-one").unwrap();

    let report = svc.execute(&batch.batch_id).await.unwrap();
    assert_eq!(report.summary.success, 2);
    assert_eq!(report.summary.failed, 1);

    let saved = svc.manifest("batch-one").unwrap();
    assert_eq!(saved.completed_jobs, 2);
    assert_eq!(saved.failed_jobs, 1);

    let export = harness.input_dir.join("failed.csv");
    assert_eq!(svc.export_failed("batch-one", &export).await.unwrap(), 1);

    let resubmitted = parse_csv(CsvSource::path(&export), &harness.config.csv).unwrap();
    assert_eq!(resubmitted.columns, vec!["id", "url"]);
    assert_eq!(resubmitted.rows.len(), 1);
    assert_eq!(resubmitted.rows[0], batch.jobs[1].params);
}

#[tokio::test]
async fn test_failed_rows_resubmit_as_new_batch() {
    let harness = TestHarness::new();
    harness.executor.fail_times("id", "3", 1, "flaky").await;
    let svc = harness.service("run-1");
    svc.start_with_batch_id(harness.csv("in.csv", 4), "batch-src").unwrap();
    svc.execute("batch-src").await.unwrap();

    let export = harness.input_dir.join("again.csv");
    svc.export_failed("batch-src", &export).await.unwrap();

    let retry_batch = svc
        .start_with_batch_id(CsvSource::path(&export), "batch-resubmit")
        .unwrap();
    assert_eq!(retry_batch.total_jobs, 1);
    let report = svc.execute("batch-resubmit").await.unwrap();
    assert_eq!(report.succeeded, 1);
}

#[tokio::test]
async fn test_counters_survive_reload_and_resave() {
    let harness = TestHarness::new();
    harness.executor.fail_when("id", "1", "nope").await;
    let svc = harness.service("run-1");
    svc.start_with_batch_id(harness.csv("in.csv", 5), "batch-idem").unwrap();
    svc.execute("batch-idem").await.unwrap();

    let store = svc.store();
    let mut loaded = store.load_manifest("batch-idem").unwrap();
    let before = (loaded.total_jobs, loaded.completed_jobs, loaded.failed_jobs);
    store.save_manifest(&mut loaded).unwrap();
    let after = store.load_manifest("batch-idem").unwrap();
    assert_eq!(before, (after.total_jobs, after.completed_jobs, after.failed_jobs));
    assert_eq!(before, (5, 4, 1));
}

#[tokio::test]
async fn test_status_counts_always_sum_to_total() {
    let harness = TestHarness::new();
    harness.executor.fail_when("id", "2", "x").await;
    harness.executor.fail_when("id", "4", "y").await;
    let svc = harness.service("run-1");
    svc.start_with_batch_id(harness.csv("in.csv", 6), "batch-inv").unwrap();

    let check = |svc: &BatchService| {
        let s = svc.status("batch-inv").unwrap();
        assert_eq!(s.success + s.failed + s.pending + s.running + s.retrying, s.total);
    };

    check(&svc);
    svc.execute("batch-inv").await.unwrap();
    check(&svc);
    svc.update_job("batch-inv", "batch-inv-0000", JobStatus::Pending)
        .await
        .unwrap();
    check(&svc);
    svc.retry("batch-inv", None).await.unwrap();
    check(&svc);
}

#[tokio::test]
async fn test_concurrency_never_exceeds_limit() {
    let harness = TestHarness::new();
    harness.executor.set_delay(Duration::from_millis(30)).await;
    let svc = harness.service("run-1");
    assert_eq!(svc.config().execution.max_concurrency, 2);
    svc.start_with_batch_id(harness.csv("in.csv", 10), "batch-conc").unwrap();

    let report = svc.execute("batch-conc").await.unwrap();
    assert_eq!(report.succeeded, 10);
    assert!(harness.executor.max_concurrent() <= 2);
}

#[tokio::test]
async fn test_retry_never_touches_successful_jobs() {
    let harness = TestHarness::new();
    harness.executor.fail_when("id", "2", "a").await;
    harness.executor.fail_when("id", "3", "b").await;
    let svc = harness.service("run-1");
    svc.start_with_batch_id(harness.csv("in.csv", 3), "batch-rx").unwrap();
    svc.execute("batch-rx").await.unwrap();

    let before = svc.manifest("batch-rx").unwrap().jobs[0].clone();
    let report = svc.retry("batch-rx", None).await.unwrap();
    assert_eq!(report.selected.len(), 2);
    assert_eq!(report.exhausted.len(), 2);

    let after = svc.manifest("batch-rx").unwrap();
    assert_eq!(after.jobs[0].status, JobStatus::Success);
    assert_eq!(after.jobs[0].attempts, before.attempts);
    assert_eq!(after.jobs[1].attempts, harness.config.retry.max_retries);
    assert_eq!(harness.executor.calls_for("id", "1").await, 1);
}

#[tokio::test]
async fn test_stop_after_first_dispatch() {
    let harness = TestHarness::new();
    harness.executor.set_delay(Duration::from_millis(100)).await;
    let mut config = harness.config.clone();
    config.execution.max_concurrency = 1;
    let context = RunContext::with_run_id(&config.storage.artifact_root, "run-stop").unwrap();
    let svc = Arc::new(
        BatchService::new(
            config,
            context,
            Arc::clone(&harness.executor) as Arc<dyn JobExecutor>,
        )
        .unwrap(),
    );
    svc.start_with_batch_id(harness.csv("in.csv", 5), "batch-stop").unwrap();

    let run = {
        let svc = Arc::clone(&svc);
        tokio::spawn(async move { svc.execute("batch-stop").await })
    };
    while harness.executor.call_count().await == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(svc.stop("batch-stop"));

    let report = run.await.unwrap().unwrap();
    assert!(report.stopped);

    let status = svc.status("batch-stop").unwrap();
    assert_eq!(status.success + status.failed, 1);
    assert_eq!(status.pending, 4);
    assert_eq!(harness.executor.call_count().await, 1);
}

#[tokio::test]
async fn test_stop_during_retry_backoff() {
    let harness = TestHarness::new();
    harness.executor.fail_when("id", "1", "timeout on login").await;
    harness.executor.fail_when("id", "2", "timeout on login").await;
    let mut config = harness.config.clone();
    config.retry.backoff_base_ms = 300;
    config.retry.max_backoff_ms = 1_000;
    let context = RunContext::with_run_id(&config.storage.artifact_root, "run-backoff").unwrap();
    let svc = Arc::new(
        BatchService::new(
            config,
            context,
            Arc::clone(&harness.executor) as Arc<dyn JobExecutor>,
        )
        .unwrap(),
    );
    svc.start_with_batch_id(harness.csv("in.csv", 2), "batch-backoff").unwrap();
    svc.execute("batch-backoff").await.unwrap();
    assert_eq!(harness.executor.call_count().await, 2);

    let retry = {
        let svc = Arc::clone(&svc);
        tokio::spawn(async move { svc.retry("batch-backoff", None).await })
    };
    while svc.status("batch-backoff").unwrap().retrying < 2 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(svc.stop("batch-backoff"));

    let report = retry.await.unwrap().unwrap();
    assert!(report.stopped);
    assert_eq!(report.dispatches, 0);
    assert_eq!(harness.executor.call_count().await, 2);

    let status = svc.status("batch-backoff").unwrap();
    assert_eq!(status.failed, 2);
    assert_eq!(status.retrying, 0);
}

#[tokio::test]
async fn test_manual_update_during_execute_is_honored() {
    let harness = TestHarness::new();
    harness.executor.set_delay(Duration::from_millis(150)).await;
    let mut config = harness.config.clone();
    config.execution.max_concurrency = 1;
    let context = RunContext::with_run_id(&config.storage.artifact_root, "run-update").unwrap();
    let svc = Arc::new(
        BatchService::new(
            config,
            context,
            Arc::clone(&harness.executor) as Arc<dyn JobExecutor>,
        )
        .unwrap(),
    );
    svc.start_with_batch_id(harness.csv("in.csv", 4), "batch-upd").unwrap();

    let run = {
        let svc = Arc::clone(&svc);
        tokio::spawn(async move { svc.execute("batch-upd").await })
    };
    while harness.executor.call_count().await == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    svc.update_job("batch-upd", "batch-upd-0001", JobStatus::Success)
        .await
        .unwrap();

    let report = run.await.unwrap().unwrap();
    assert_eq!(report.dispatched, 3);

    let status = svc.status("batch-upd").unwrap();
    assert_eq!(status.success, 4);
    assert_eq!(status.pending, 0);
    assert_eq!(harness.executor.calls_for("id", "2").await, 0);
}

#[tokio::test]
async fn test_later_run_resumes_batch() {
    let harness = TestHarness::new();
    harness.executor.set_delay(Duration::from_millis(50)).await;

    let first = Arc::new(harness.service("run-20260101T000000-aaaa"));
    first
        .start_with_batch_id(harness.csv("in.csv", 4), "batch-resume")
        .unwrap();
    let run = {
        let svc = Arc::clone(&first);
        tokio::spawn(async move { svc.execute("batch-resume").await })
    };
    while harness.executor.call_count().await == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    first.stop("batch-resume");
    run.await.unwrap().unwrap();
    let done_before = first.status("batch-resume").unwrap().success;
    assert!(done_before >= 1 && done_before < 4);

    // A new process finds the batch in the earlier run and finishes it.
    let second = harness.service("run-20260102T000000-bbbb");
    let report = second.execute("batch-resume").await.unwrap();
    assert_eq!(report.skipped, done_before);
    assert_eq!(report.dispatched, 4 - done_before);
    assert!(report.summary.is_finished());
    assert_eq!(harness.executor.call_count().await, 4);
}

#[tokio::test]
async fn test_crashed_run_is_recovered() {
    let harness = TestHarness::new();
    let svc = harness.service("run-1");
    svc.start_with_batch_id(harness.csv("in.csv", 2), "batch-crash").unwrap();

    // Simulate a process that died mid-dispatch.
    let store = ManifestStore::new(RunContext::with_run_id(&harness.config.storage.artifact_root, "run-1").unwrap());
    let mut manifest = store.load_manifest("batch-crash").unwrap();
    manifest.jobs[1].mark_running().unwrap();
    store.save_manifest(&mut manifest).unwrap();

    let restarted = harness.service("run-2");
    assert_eq!(restarted.status("batch-crash").unwrap().running, 1);
    let report = restarted.execute("batch-crash").await.unwrap();
    assert_eq!(report.recovered, 1);
    assert_eq!(report.summary.success, 2);
    assert_eq!(restarted.manifest("batch-crash").unwrap().jobs[1].attempts, 2);
}

#[tokio::test]
async fn test_failure_report_lists_errors() {
    let harness = TestHarness::new();
    harness
        .executor
        .fail_when("id", "1", "401 Unauthorized token=abcdef")
        .await;
    let svc = harness.service("run-1");
    svc.start_with_batch_id(harness.csv("in.csv", 2), "batch-rep").unwrap();
    svc.execute("batch-rep").await.unwrap();

    let dest = harness.input_dir.join("report.csv");
    assert_eq!(svc.export_report("batch-rep", &dest).await.unwrap(), 1);
    let content = std::fs::read_to_string(&dest).unwrap();
    assert!(content.starts_with("job_id,row_index,attempts,error_message,id,url"));
    assert!(content.contains("401 Unauthorized token=[REDACTED]"));
    assert!(!content.contains("abcdef"));
}

#[test]
fn test_path_traversal_rejected_before_anything_is_written() {
    let harness = TestHarness::new();
    let mut config = harness.config.clone();
    config.csv.allowed_root = Some(harness.input_dir.clone());
    let context = RunContext::with_run_id(&config.storage.artifact_root, "run-1").unwrap();
    let svc = BatchService::new(
        config,
        context,
        Arc::clone(&harness.executor) as Arc<dyn JobExecutor>,
    )
    .unwrap();

    let outside = harness.input_dir.join("..").join("secrets.csv");
    let err = svc.start(CsvSource::path(outside)).unwrap_err();
    assert!(matches!(err, BatchError::Security(_)));
    assert!(svc.list_batches().unwrap().is_empty());
}

#[test]
fn test_manual_update_from_sync_caller() {
    let harness = TestHarness::new();
    let svc = harness.service("run-1");
    svc.start_with_batch_id(harness.csv("in.csv", 1), "batch-sync").unwrap();

    let job = tokio_test::block_on(svc.update_job("batch-sync", "batch-sync-0000", JobStatus::Success))
        .unwrap();
    assert_eq!(job.status, JobStatus::Success);
    assert_eq!(svc.status("batch-sync").unwrap().success, 1);
}
