use clm_common::config::StoreConfig;
use clm_common::{ExecutionMode, JobType};
use clm_executor::{DirectExecutor, PoolConfig, RunMode, WorkerLaunchSpec, WorkerPool};
use clm_protocol::DirectClient;
use clm_store::Store;
use std::sync::Arc;
use std::time::Duration;
use test_r::test;

test_r::enable!();

async fn open_test_store() -> (Arc<Store>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig {
        db_path: dir.path().join("test.db"),
        poll_interval: Duration::from_millis(20),
        ..Default::default()
    };
    (Arc::new(Store::open(config).await.unwrap()), dir)
}

#[test]
async fn start_worker_times_out_if_it_never_leaves_starting() {
    let (store, _dir) = open_test_store().await;
    let protocol = Arc::new(DirectClient::new(store.clone()));
    let pool = WorkerPool::new(
        Arc::new(DirectExecutor::new()),
        store.clone(),
        protocol,
        PoolConfig {
            max_worker_startup_concurrency: 2,
            worker_startup_timeout: Duration::from_millis(150),
            stop_grace_window: Duration::from_millis(200),
        },
    );

    let spec = WorkerLaunchSpec {
        worker_type: JobType::Notebook,
        target: "sleep".to_string(),
        args: vec!["5".to_string()],
        working_dir: std::env::temp_dir(),
        sidecar_addr: "http://127.0.0.1:0".to_string(),
    };

    let result = pool
        .start_worker(spec, ExecutionMode::Direct, RunMode::AutoStart)
        .await;
    assert!(
        result.is_err(),
        "a worker that never heartbeats must time out rather than hang forever"
    );
}

#[test]
async fn start_worker_succeeds_once_store_marks_it_ready() {
    let (store, _dir) = open_test_store().await;
    let protocol = Arc::new(DirectClient::new(store.clone()));
    let pool = Arc::new(WorkerPool::new(
        Arc::new(DirectExecutor::new()),
        store.clone(),
        protocol,
        PoolConfig {
            max_worker_startup_concurrency: 2,
            worker_startup_timeout: Duration::from_secs(2),
            stop_grace_window: Duration::from_millis(200),
        },
    ));

    let spec = WorkerLaunchSpec {
        worker_type: JobType::Notebook,
        target: "sleep".to_string(),
        args: vec!["5".to_string()],
        working_dir: std::env::temp_dir(),
        sidecar_addr: "http://127.0.0.1:0".to_string(),
    };

    let started = {
        let store = store.clone();
        tokio::spawn(async move {
            // Simulate the worker's own first heartbeat arriving shortly
            // after registration, the way `clm-worker` would in practice.
            for _ in 0..20 {
                tokio::time::sleep(Duration::from_millis(50)).await;
                let workers = store.all_workers().await.unwrap();
                if let Some(w) = workers.iter().find(|w| w.status == clm_common::WorkerStatus::Starting)
                {
                    store.mark_worker_ready(w.id).await.unwrap();
                    return;
                }
            }
        })
    };

    let worker_id = pool
        .start_worker(spec, ExecutionMode::Direct, RunMode::AutoStart)
        .await
        .expect("worker should become ready before the timeout");
    started.await.unwrap();

    assert_eq!(pool.worker_count().await, 1);
    pool.stop_all().await.unwrap();
    let worker = store.get_worker(worker_id).await.unwrap().unwrap();
    assert_eq!(worker.status, clm_common::WorkerStatus::Dead);
}
