use crate::error::ExecutorResult;
use crate::launch::WorkerLaunchSpec;
use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Child;

/// A running worker process, however it was started. `executor_id` is what
/// gets passed to `Store::register_worker` so the store can refer to the
/// process without knowing which executor owns it.
pub enum RunningWorker {
    Direct { child: Child, executor_id: String },
    Containerized { container_id: String },
}

impl RunningWorker {
    pub fn executor_id(&self) -> &str {
        match self {
            RunningWorker::Direct { executor_id, .. } => executor_id,
            RunningWorker::Containerized { container_id } => container_id,
        }
    }

    /// OS process id, for direct workers a caller wants to record outside
    /// this process's lifetime (persistent worker state, spec.md §6).
    pub fn pid(&self) -> Option<u32> {
        match self {
            RunningWorker::Direct { child, .. } => child.id(),
            RunningWorker::Containerized { .. } => None,
        }
    }

    /// Container id, for containerized workers recorded the same way.
    pub fn container_id(&self) -> Option<&str> {
        match self {
            RunningWorker::Containerized { container_id } => Some(container_id),
            RunningWorker::Direct { .. } => None,
        }
    }
}

#[async_trait]
pub trait Executor: Send + Sync {
    async fn start(&self, spec: &WorkerLaunchSpec) -> ExecutorResult<RunningWorker>;

    async fn stop(&self, worker: &mut RunningWorker, grace: Duration) -> ExecutorResult<()>;

    async fn is_running(&self, worker: &mut RunningWorker) -> bool;
}
