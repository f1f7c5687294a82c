use clm_common::config::StoreConfig;
use clm_common::{ExecutionMode, JobStatus, JobType, StructuredError};
use clm_store::Store;
use std::time::Duration;
use test_r::test;

test_r::enable!();

async fn open_test_store() -> (Store, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig {
        db_path: dir.path().join("test.db"),
        busy_timeout: Duration::from_secs(5),
        poll_interval: Duration::from_millis(20),
        ..Default::default()
    };
    let store = Store::open(config).await.expect("store should open");
    (store, dir)
}

#[test]
async fn submit_then_claim_returns_the_job() {
    let (store, _dir) = open_test_store().await;

    let job_id = store
        .submit(
            JobType::Notebook,
            "course/01-intro.ipynb",
            "out/01-intro.html",
            &serde_json::json!({"language": "en"}),
            "hash-abc",
            0,
            "corr-1",
        )
        .await
        .unwrap();

    let worker_id = store
        .register_worker(JobType::Notebook, ExecutionMode::Direct, "pid-123")
        .await
        .unwrap();

    let claimed = store
        .claim_next(JobType::Notebook, worker_id, Duration::from_millis(100))
        .await
        .unwrap()
        .expect("a pending job should be claimable");

    assert_eq!(claimed.id, job_id);
    assert_eq!(claimed.status, JobStatus::Processing);
    assert_eq!(claimed.worker_id, Some(worker_id));
}

#[test]
async fn claim_next_is_fifo_by_priority_then_id() {
    let (store, _dir) = open_test_store().await;
    let worker_id = store
        .register_worker(JobType::Plantuml, ExecutionMode::Direct, "pid-1")
        .await
        .unwrap();

    let low = store
        .submit(
            JobType::Plantuml,
            "a.puml",
            "a.svg",
            &serde_json::json!({}),
            "hash-a",
            0,
            "corr-a",
        )
        .await
        .unwrap();
    let high = store
        .submit(
            JobType::Plantuml,
            "b.puml",
            "b.svg",
            &serde_json::json!({}),
            "hash-b",
            10,
            "corr-b",
        )
        .await
        .unwrap();

    let first = store
        .claim_next(JobType::Plantuml, worker_id, Duration::ZERO)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.id, high, "higher priority job must be claimed first");

    let second = store
        .claim_next(JobType::Plantuml, worker_id, Duration::ZERO)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.id, low);
}

#[test]
async fn claim_next_returns_none_when_queue_empty_and_wait_elapses() {
    let (store, _dir) = open_test_store().await;
    let worker_id = store
        .register_worker(JobType::Drawio, ExecutionMode::Direct, "pid-2")
        .await
        .unwrap();

    let result = store
        .claim_next(JobType::Drawio, worker_id, Duration::from_millis(60))
        .await
        .unwrap();
    assert!(result.is_none());
}

#[test]
async fn complete_requires_matching_worker_and_processing_status() {
    let (store, _dir) = open_test_store().await;
    let worker_id = store
        .register_worker(JobType::Notebook, ExecutionMode::Direct, "pid-3")
        .await
        .unwrap();
    let other_worker = store
        .register_worker(JobType::Notebook, ExecutionMode::Direct, "pid-4")
        .await
        .unwrap();

    let job_id = store
        .submit(
            JobType::Notebook,
            "c.ipynb",
            "c.html",
            &serde_json::json!({}),
            "hash-c",
            0,
            "corr-c",
        )
        .await
        .unwrap();
    store
        .claim_next(JobType::Notebook, worker_id, Duration::ZERO)
        .await
        .unwrap()
        .unwrap();

    let wrong_worker = store.complete(job_id, other_worker).await;
    assert!(wrong_worker.is_err());

    store.complete(job_id, worker_id).await.unwrap();
    let job = store.get_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Succeeded);
}

#[test]
async fn fail_records_structured_error_and_frees_worker() {
    let (store, _dir) = open_test_store().await;
    let worker_id = store
        .register_worker(JobType::Notebook, ExecutionMode::Direct, "pid-5")
        .await
        .unwrap();
    let job_id = store
        .submit(
            JobType::Notebook,
            "d.ipynb",
            "d.html",
            &serde_json::json!({}),
            "hash-d",
            0,
            "corr-d",
        )
        .await
        .unwrap();
    store
        .claim_next(JobType::Notebook, worker_id, Duration::ZERO)
        .await
        .unwrap()
        .unwrap();

    let err = StructuredError {
        error_class: "CellExecutionError".to_string(),
        message: "division by zero".to_string(),
        traceback: None,
        cell_index: Some(3),
        cell_source: None,
        line: None,
        column: None,
        category_hint: Some("user".to_string()),
    };
    store.fail(job_id, worker_id, &err).await.unwrap();

    let job = store.get_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.unwrap().cell_index, Some(3));

    let worker = store.get_worker(worker_id).await.unwrap().unwrap();
    assert_eq!(worker.jobs_failed, 1);
}

#[test]
async fn requeue_stale_returns_job_to_pending_and_bumps_attempt_count() {
    let (store, _dir) = open_test_store().await;
    let worker_id = store
        .register_worker(JobType::Notebook, ExecutionMode::Direct, "pid-6")
        .await
        .unwrap();
    let job_id = store
        .submit(
            JobType::Notebook,
            "e.ipynb",
            "e.html",
            &serde_json::json!({}),
            "hash-e",
            0,
            "corr-e",
        )
        .await
        .unwrap();
    store
        .claim_next(JobType::Notebook, worker_id, Duration::ZERO)
        .await
        .unwrap()
        .unwrap();

    store.requeue_stale(job_id).await.unwrap();
    let job = store.get_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.attempt_count, 1);
    assert!(job.worker_id.is_none());
}

#[test]
async fn cache_put_then_get_round_trips_and_bumps_last_accessed() {
    let (store, _dir) = open_test_store().await;
    store
        .cache_put(
            "hash-f",
            Some("out/f.html"),
            None,
            Some(&serde_json::json!([{"cell": 0, "output": "42"}])),
            1024,
        )
        .await
        .unwrap();

    let entry = store.cache_get("hash-f").await.unwrap().unwrap();
    assert_eq!(entry.artifact_path.as_deref(), Some("out/f.html"));
    assert_eq!(entry.size_bytes, 1024);

    let missing = store.cache_get("hash-nonexistent").await.unwrap();
    assert!(missing.is_none());
}

#[test]
async fn evict_cache_lru_drops_oldest_entries_above_budget() {
    let (store, _dir) = open_test_store().await;
    for i in 0..5 {
        store
            .cache_put(&format!("hash-{i}"), Some("p"), None, None, 100)
            .await
            .unwrap();
    }

    let evicted = store.evict_cache_lru(250).await.unwrap();
    assert!(evicted >= 2, "must evict enough entries to fit the budget");
}

#[test]
async fn mark_dead_and_requeue_frees_in_flight_jobs() {
    let (store, _dir) = open_test_store().await;
    let worker_id = store
        .register_worker(JobType::Notebook, ExecutionMode::Direct, "pid-7")
        .await
        .unwrap();
    let job_id = store
        .submit(
            JobType::Notebook,
            "g.ipynb",
            "g.html",
            &serde_json::json!({}),
            "hash-g",
            0,
            "corr-g",
        )
        .await
        .unwrap();
    store
        .claim_next(JobType::Notebook, worker_id, Duration::ZERO)
        .await
        .unwrap()
        .unwrap();

    let requeued = store.mark_dead_and_requeue(worker_id).await.unwrap();
    assert_eq!(requeued, 1);

    let job = store.get_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Pending);

    let worker = store.get_worker(worker_id).await.unwrap().unwrap();
    assert_eq!(worker.status, clm_common::WorkerStatus::Dead);
}

#[test]
async fn retry_failed_bumps_attempt_count_and_clears_the_error() {
    let (store, _dir) = open_test_store().await;
    let worker_id = store
        .register_worker(JobType::Notebook, ExecutionMode::Direct, "pid-8")
        .await
        .unwrap();
    let job_id = store
        .submit(
            JobType::Notebook,
            "h.ipynb",
            "h.html",
            &serde_json::json!({}),
            "hash-h",
            0,
            "corr-h",
        )
        .await
        .unwrap();
    store
        .claim_next(JobType::Notebook, worker_id, Duration::ZERO)
        .await
        .unwrap()
        .unwrap();

    let err = StructuredError {
        error_class: "WorkerUnavailable".to_string(),
        message: "connection reset".to_string(),
        traceback: None,
        cell_index: None,
        cell_source: None,
        line: None,
        column: None,
        category_hint: None,
    };
    store.fail(job_id, worker_id, &err).await.unwrap();

    store.retry_failed(job_id).await.unwrap();

    let job = store.get_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.attempt_count, 1);
    assert!(job.error.is_none());
}

#[test]
async fn retry_failed_rejects_a_job_that_is_not_failed() {
    let (store, _dir) = open_test_store().await;
    let job_id = store
        .submit(
            JobType::Notebook,
            "i.ipynb",
            "i.html",
            &serde_json::json!({}),
            "hash-i",
            0,
            "corr-i",
        )
        .await
        .unwrap();

    assert!(store.retry_failed(job_id).await.is_err());
}
