//! Shells out to the `docker` CLI rather than linking a Docker Engine API
//! client, matching the teacher pack's preference for CLI subprocesses over
//! speculative API bindings (spec.md §4.3, `ExecutionMode::Docker`).

use crate::error::{ExecutorError, ExecutorResult};
use crate::executor::{Executor, RunningWorker};
use crate::launch::{to_container_path, WorkerLaunchSpec};
use std::time::Duration;
use tokio::process::Command;
use tracing::warn;

pub struct ContainerizedExecutor {
    docker_bin: String,
}

impl ContainerizedExecutor {
    pub fn new() -> Self {
        Self {
            docker_bin: "docker".to_string(),
        }
    }

    pub fn with_docker_binary(docker_bin: impl Into<String>) -> Self {
        Self {
            docker_bin: docker_bin.into(),
        }
    }

    async fn run(&self, args: &[&str]) -> ExecutorResult<String> {
        let output = Command::new(&self.docker_bin)
            .args(args)
            .output()
            .await
            .map_err(ExecutorError::Spawn)?;

        if !output.status.success() {
            return Err(ExecutorError::Docker(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl Default for ContainerizedExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Executor for ContainerizedExecutor {
    async fn start(&self, spec: &WorkerLaunchSpec) -> ExecutorResult<RunningWorker> {
        let mount = to_container_path(&spec.working_dir)?;
        let mount_arg = format!("{}:{}", spec.working_dir.display(), mount);

        let mut args: Vec<String> = vec![
            "run".to_string(),
            "-d".to_string(),
            "--rm".to_string(),
            "--network".to_string(),
            "host".to_string(),
            "-v".to_string(),
            mount_arg,
            "-e".to_string(),
            format!("CLM_SIDECAR_ADDR={}", spec.sidecar_addr),
            spec.target.clone(),
        ];
        args.extend(spec.args.iter().cloned());

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let container_id = self.run(&arg_refs).await?;

        Ok(RunningWorker::Containerized { container_id })
    }

    async fn stop(&self, worker: &mut RunningWorker, grace: Duration) -> ExecutorResult<()> {
        let RunningWorker::Containerized { container_id } = worker else {
            return Ok(());
        };

        let grace_secs = grace.as_secs().to_string();
        if let Err(err) = self
            .run(&["stop", "-t", &grace_secs, container_id])
            .await
        {
            warn!(%container_id, error = %err, "docker stop failed, forcing removal");
            self.run(&["rm", "-f", container_id]).await?;
        }
        Ok(())
    }

    async fn is_running(&self, worker: &mut RunningWorker) -> bool {
        let RunningWorker::Containerized { container_id } = worker else {
            return false;
        };
        self.run(&[
            "inspect",
            "-f",
            "{{.State.Running}}",
            container_id.as_str(),
        ])
        .await
        .map(|s| s == "true")
        .unwrap_or(false)
    }
}
