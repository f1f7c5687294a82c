//! Worker Pool & Lifecycle Manager (spec.md §4.4): bounded-concurrency
//! startup, heartbeat-based health monitoring, and graceful shutdown.

use crate::error::{ExecutorError, ExecutorResult};
use crate::executor::{Executor, RunningWorker};
use crate::launch::WorkerLaunchSpec;
use clm_common::{ExecutionMode, JobType};
use clm_protocol::WorkerClient;
use clm_store::Store;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tracing::{info, warn};

/// How a worker's lifetime is tied to the build (spec.md §4.4, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Started on first job of its type, stopped when the build ends.
    AutoStart,
    /// Started and stopped explicitly via `start-services`/`stop-services`.
    Managed,
    /// Left running across builds until `workers cleanup` is invoked.
    Persistent,
}

pub struct PoolConfig {
    pub max_worker_startup_concurrency: usize,
    pub worker_startup_timeout: Duration,
    pub stop_grace_window: Duration,
}

struct PooledWorker {
    worker_id: i64,
    running: RunningWorker,
    run_mode: RunMode,
}

pub struct WorkerPool {
    executor: Arc<dyn Executor>,
    store: Arc<Store>,
    protocol: Arc<dyn WorkerClient>,
    config: PoolConfig,
    workers: Mutex<HashMap<i64, PooledWorker>>,
    startup_permits: Semaphore,
}

impl WorkerPool {
    pub fn new(
        executor: Arc<dyn Executor>,
        store: Arc<Store>,
        protocol: Arc<dyn WorkerClient>,
        config: PoolConfig,
    ) -> Self {
        let permits = config.max_worker_startup_concurrency;
        Self {
            executor,
            store,
            protocol,
            config,
            workers: Mutex::new(HashMap::new()),
            startup_permits: Semaphore::new(permits),
        }
    }

    /// Starts one worker, bounded by `max_worker_startup_concurrency`
    /// in-flight starts across the whole pool. Returns once the worker has
    /// registered and sent its first heartbeat, or fails if it doesn't
    /// within `worker_startup_timeout`.
    pub async fn start_worker(
        &self,
        spec: WorkerLaunchSpec,
        execution_mode: ExecutionMode,
        run_mode: RunMode,
    ) -> ExecutorResult<i64> {
        let _permit = self
            .startup_permits
            .acquire()
            .await
            .expect("semaphore is never closed");

        let running = self.executor.start(&spec).await?;
        let executor_id = running.executor_id().to_string();

        let worker_id = self
            .protocol
            .register(spec.worker_type, execution_mode, &executor_id)
            .await?;

        self.await_first_heartbeat(worker_id).await?;
        self.store.mark_worker_ready(worker_id).await?;

        info!(worker_id, worker_type = %spec.worker_type, "worker ready");

        let mut workers = self.workers.lock().await;
        workers.insert(
            worker_id,
            PooledWorker {
                worker_id,
                running,
                run_mode,
            },
        );
        Ok(worker_id)
    }

    async fn await_first_heartbeat(&self, worker_id: i64) -> ExecutorResult<()> {
        let deadline = tokio::time::Instant::now() + self.config.worker_startup_timeout;
        loop {
            if let Some(worker) = self.store.get_worker(worker_id).await? {
                if worker.status != clm_common::WorkerStatus::Starting {
                    return Ok(());
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(ExecutorError::StartupTimeout);
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Sweeps workers whose heartbeat has gone stale in the store *and*
    /// whose process/container the executor agrees is gone, marking them
    /// dead and requeuing their in-flight job (spec.md §4.4).
    pub async fn health_sweep(&self, freshness_window: Duration) -> ExecutorResult<usize> {
        let stale = self.store.stale_workers(freshness_window).await?;
        let mut reaped = 0;
        let mut workers = self.workers.lock().await;
        for worker in stale {
            let still_running = match workers.get_mut(&worker.id) {
                Some(pooled) => self.executor.is_running(&mut pooled.running).await,
                None => false,
            };
            if !still_running {
                warn!(worker_id = worker.id, "worker heartbeat stale and process gone, reaping");
                self.store.mark_dead_and_requeue(worker.id).await?;
                workers.remove(&worker.id);
                reaped += 1;
            }
        }
        Ok(reaped)
    }

    /// Stops every worker whose `run_mode` is not `Persistent`. Called at
    /// the end of a build; `stop-services --force` and `workers cleanup`
    /// reach through to this too with a different selection.
    pub async fn stop_non_persistent(&self) -> ExecutorResult<()> {
        let mut workers = self.workers.lock().await;
        let ids: Vec<i64> = workers
            .iter()
            .filter(|(_, w)| w.run_mode != RunMode::Persistent)
            .map(|(id, _)| *id)
            .collect();

        for id in ids {
            if let Some(mut pooled) = workers.remove(&id) {
                self.executor
                    .stop(&mut pooled.running, self.config.stop_grace_window)
                    .await?;
                self.store.deregister_worker(id).await?;
            }
        }
        Ok(())
    }

    pub async fn stop_all(&self) -> ExecutorResult<()> {
        let mut workers = self.workers.lock().await;
        let ids: Vec<i64> = workers.keys().copied().collect();
        for id in ids {
            if let Some(mut pooled) = workers.remove(&id) {
                self.executor
                    .stop(&mut pooled.running, self.config.stop_grace_window)
                    .await?;
                self.store.deregister_worker(id).await?;
            }
        }
        Ok(())
    }

    /// Process/container handle for a pooled worker, for callers that need
    /// to record it somewhere that outlives this pool (persistent worker
    /// state, spec.md §6).
    pub async fn worker_handle(&self, worker_id: i64) -> Option<(Option<u32>, Option<String>)> {
        let workers = self.workers.lock().await;
        workers
            .get(&worker_id)
            .map(|w| (w.running.pid(), w.running.container_id().map(str::to_string)))
    }

    pub async fn has_worker_of_type(&self, worker_type: JobType) -> ExecutorResult<bool> {
        Ok(self
            .store
            .workers_by_type(worker_type)
            .await?
            .iter()
            .any(|w| w.status.is_healthy_status()))
    }

    pub async fn worker_count(&self) -> usize {
        self.workers.lock().await.len()
    }
}
