use async_trait::async_trait;
use clm_common::config::StoreConfig;
use clm_common::{ExecutionMode, JobType, Kind, Language, ProgLang, StructuredError, WorkerPayload};
use clm_protocol::{DirectClient, WorkerClient};
use clm_store::Store;
use clm_worker::{RenderBackend, RenderOutcome, SimulatedRenderBackend, WorkerLoopConfig};
use std::sync::Arc;
use std::time::Duration;
use test_r::test;
use tokio_util::sync::CancellationToken;

test_r::enable!();

async fn open_test_store() -> (Arc<Store>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig {
        db_path: dir.path().join("t.db"),
        poll_interval: Duration::from_millis(20),
        ..Default::default()
    };
    (Arc::new(Store::open(config).await.unwrap()), dir)
}

fn payload(input_name: &str, output_path: std::path::PathBuf) -> serde_json::Value {
    serde_json::to_value(clm_common::WorkerPayload {
        input_path: std::path::PathBuf::from(input_name),
        output_path,
        language: Language::En,
        format: clm_common::Format::Html,
        kind: Kind::CodeAlong,
        prog_lang: ProgLang::Python,
        templates_ref: "default".to_string(),
        fallback_execute: false,
        target_name: "default".to_string(),
        content_hash: "hash-unused".to_string(),
        implicit: false,
        cached_cell_outputs: None,
    })
    .unwrap()
}

#[test]
async fn worker_loop_processes_one_job_then_shuts_down_cleanly() {
    let (store, dir) = open_test_store().await;
    let output = dir.path().join("out.html");

    store
        .submit(
            JobType::Notebook,
            "01-intro.ipynb",
            &output.to_string_lossy(),
            &payload("01-intro.ipynb", output.clone()),
            "hash-1",
            0,
            "corr-1",
        )
        .await
        .unwrap();

    let client: Arc<dyn WorkerClient> = Arc::new(DirectClient::new(store.clone()));
    let shutdown = CancellationToken::new();
    let shutdown_for_task = shutdown.clone();

    let handle = tokio::spawn(clm_worker::run(
        client,
        Arc::new(SimulatedRenderBackend),
        WorkerLoopConfig {
            job_type: JobType::Notebook,
            execution_mode: ExecutionMode::Direct,
            executor_id: "test-exec".to_string(),
            poll_wait: Duration::from_millis(100),
            heartbeat_interval: Duration::from_millis(50),
            max_job_time: Duration::from_secs(5),
        },
        shutdown_for_task,
    ));

    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        if output.exists() {
            break;
        }
    }
    assert!(output.exists(), "worker should have written the output file");

    shutdown.cancel();
    handle.await.unwrap().unwrap();

    let workers = store.all_workers().await.unwrap();
    assert_eq!(workers.len(), 1);
    assert_eq!(workers[0].status, clm_common::WorkerStatus::Dead);
}

#[test]
async fn worker_loop_reports_structured_failure_for_a_failing_input() {
    let (store, dir) = open_test_store().await;
    let output = dir.path().join("out-fail.html");

    let job_id = store
        .submit(
            JobType::Notebook,
            "fail-case.ipynb",
            &output.to_string_lossy(),
            &payload("fail-case.ipynb", output.clone()),
            "hash-2",
            0,
            "corr-2",
        )
        .await
        .unwrap();

    let client: Arc<dyn WorkerClient> = Arc::new(DirectClient::new(store.clone()));
    let shutdown = CancellationToken::new();
    let shutdown_for_task = shutdown.clone();

    let handle = tokio::spawn(clm_worker::run(
        client,
        Arc::new(SimulatedRenderBackend),
        WorkerLoopConfig {
            job_type: JobType::Notebook,
            execution_mode: ExecutionMode::Direct,
            executor_id: "test-exec-2".to_string(),
            poll_wait: Duration::from_millis(100),
            heartbeat_interval: Duration::from_millis(50),
            max_job_time: Duration::from_secs(5),
        },
        shutdown_for_task,
    ));

    let mut job = None;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let candidate = store.get_job(job_id).await.unwrap().unwrap();
        if candidate.status.is_terminal() {
            job = Some(candidate);
            break;
        }
    }
    shutdown.cancel();
    handle.await.unwrap().unwrap();

    let job = job.expect("job should have reached a terminal state");
    assert_eq!(job.status, clm_common::JobStatus::Failed);
    assert_eq!(job.error.unwrap().error_class, "SimulatedRenderError");
}

#[test]
async fn worker_loop_implicit_job_never_writes_under_output_root() {
    let (store, dir) = open_test_store().await;
    let output = dir.path().join("implicit.html");

    let mut payload = serde_json::from_value::<WorkerPayload>(payload("speaker.ipynb", output.clone())).unwrap();
    payload.implicit = true;
    store
        .submit(
            JobType::Notebook,
            "speaker.ipynb",
            &output.to_string_lossy(),
            &serde_json::to_value(&payload).unwrap(),
            "hash-implicit",
            0,
            "corr-implicit",
        )
        .await
        .unwrap();

    let client: Arc<dyn WorkerClient> = Arc::new(DirectClient::new(store.clone()));
    let shutdown = CancellationToken::new();
    let shutdown_for_task = shutdown.clone();

    let handle = tokio::spawn(clm_worker::run(
        client,
        Arc::new(SimulatedRenderBackend),
        WorkerLoopConfig {
            job_type: JobType::Notebook,
            execution_mode: ExecutionMode::Direct,
            executor_id: "test-exec-implicit".to_string(),
            poll_wait: Duration::from_millis(100),
            heartbeat_interval: Duration::from_millis(50),
            max_job_time: Duration::from_secs(5),
        },
        shutdown_for_task,
    ));

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(
        !output.exists(),
        "an implicit operation must never materialize a file under a target's output_root"
    );

    shutdown.cancel();
    handle.await.unwrap().unwrap();
}

struct StallingBackend;

#[async_trait]
impl RenderBackend for StallingBackend {
    async fn render(&self, _payload: &WorkerPayload) -> Result<RenderOutcome, StructuredError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        unreachable!("max_job_time should have elapsed first");
    }
}

#[test]
async fn worker_loop_reports_timeout_when_render_exceeds_max_job_time() {
    let (store, dir) = open_test_store().await;
    let output = dir.path().join("slow.html");

    let job_id = store
        .submit(
            JobType::Notebook,
            "slow.ipynb",
            &output.to_string_lossy(),
            &payload("slow.ipynb", output.clone()),
            "hash-slow",
            0,
            "corr-slow",
        )
        .await
        .unwrap();

    let client: Arc<dyn WorkerClient> = Arc::new(DirectClient::new(store.clone()));
    let shutdown = CancellationToken::new();
    let shutdown_for_task = shutdown.clone();

    let handle = tokio::spawn(clm_worker::run(
        client,
        Arc::new(StallingBackend),
        WorkerLoopConfig {
            job_type: JobType::Notebook,
            execution_mode: ExecutionMode::Direct,
            executor_id: "test-exec-slow".to_string(),
            poll_wait: Duration::from_millis(100),
            heartbeat_interval: Duration::from_millis(50),
            max_job_time: Duration::from_millis(50),
        },
        shutdown_for_task,
    ));

    let mut job = None;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let candidate = store.get_job(job_id).await.unwrap().unwrap();
        if candidate.status.is_terminal() {
            job = Some(candidate);
            break;
        }
    }
    shutdown.cancel();
    handle.await.unwrap().unwrap();

    let job = job.expect("job should have reached a terminal state");
    assert_eq!(job.status, clm_common::JobStatus::Failed);
    assert_eq!(job.error.unwrap().error_class, "WorkerTimeoutError");
}
