//! Spawns a worker as a plain child process on the same host as the
//! engine (spec.md §4.3, `ExecutionMode::Direct`).

use crate::error::{ExecutorError, ExecutorResult};
use crate::executor::{Executor, RunningWorker};
use crate::launch::WorkerLaunchSpec;
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{info, warn};
use uuid::Uuid;

pub struct DirectExecutor;

impl DirectExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DirectExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Executor for DirectExecutor {
    async fn start(&self, spec: &WorkerLaunchSpec) -> ExecutorResult<RunningWorker> {
        let mut cmd = Command::new(&spec.target);
        cmd.args(&spec.args)
            .current_dir(&spec.working_dir)
            .env("CLM_SIDECAR_ADDR", &spec.sidecar_addr)
            .kill_on_drop(true)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(ExecutorError::Spawn)?;
        let executor_id = Uuid::new_v4().to_string();

        if let Some(stdout) = child.stdout.take() {
            let worker_type = spec.worker_type;
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    info!(%worker_type, stream = "stdout", "{line}");
                }
            });
        }
        if let Some(stderr) = child.stderr.take() {
            let worker_type = spec.worker_type;
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    warn!(%worker_type, stream = "stderr", "{line}");
                }
            });
        }

        Ok(RunningWorker::Direct { child, executor_id })
    }

    async fn stop(&self, worker: &mut RunningWorker, grace: Duration) -> ExecutorResult<()> {
        let RunningWorker::Direct { child, .. } = worker else {
            return Ok(());
        };

        if let Some(pid) = child.id() {
            // SIGTERM via `kill`'s platform default signal; tokio's Child has
            // no cross-platform "terminate" so direct workers are asked to
            // exit through the protocol (deregister) first and this is the
            // last-resort path.
            #[cfg(unix)]
            {
                unsafe {
                    libc_kill(pid as i32, 15);
                }
            }
        }

        match tokio::time::timeout(grace, child.wait()).await {
            Ok(_) => Ok(()),
            Err(_) => {
                warn!("worker did not exit within the grace window, killing");
                child.kill().await.map_err(ExecutorError::Io)
            }
        }
    }

    async fn is_running(&self, worker: &mut RunningWorker) -> bool {
        match worker {
            RunningWorker::Direct { child, .. } => matches!(child.try_wait(), Ok(None)),
            RunningWorker::Containerized { .. } => false,
        }
    }
}

#[cfg(unix)]
unsafe fn libc_kill(pid: i32, sig: i32) {
    extern "C" {
        fn kill(pid: i32, sig: i32) -> i32;
    }
    let _ = kill(pid, sig);
}
