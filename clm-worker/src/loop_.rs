//! The worker-side protocol loop (spec.md §4.2, §6): register once, then
//! repeatedly poll for a job, render it, and report the outcome, sending a
//! heartbeat between polls so the engine's freshness check never goes
//! stale while a job is still running.

use crate::backend::RenderBackend;
use clm_common::{ExecutionMode, JobType, StructuredError};
use clm_protocol::WorkerClient;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub struct WorkerLoopConfig {
    pub job_type: JobType,
    pub execution_mode: ExecutionMode,
    pub executor_id: String,
    pub poll_wait: Duration,
    pub heartbeat_interval: Duration,
    /// Bounds a single `render` call (spec.md §5 `max_job_time`). Elapsing
    /// reports the job as failed with an infrastructure-category error
    /// instead of letting a stuck renderer hold the worker forever.
    pub max_job_time: Duration,
}

pub async fn run(
    client: Arc<dyn WorkerClient>,
    backend: Arc<dyn RenderBackend>,
    config: WorkerLoopConfig,
    shutdown: CancellationToken,
) -> clm_protocol::ProtocolResult<()> {
    let worker_id = client
        .register(config.job_type, config.execution_mode, &config.executor_id)
        .await?;
    info!(worker_id, job_type = %config.job_type, "worker registered");

    let heartbeat_client = client.clone();
    let heartbeat_shutdown = shutdown.clone();
    let heartbeat_interval = config.heartbeat_interval;
    let heartbeat_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(heartbeat_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = heartbeat_client.heartbeat(worker_id).await {
                        warn!(worker_id, error = %err, "heartbeat failed");
                    }
                }
                _ = heartbeat_shutdown.cancelled() => break,
            }
        }
    });

    let result = poll_loop(client.as_ref(), backend.as_ref(), &config, worker_id, &shutdown).await;

    heartbeat_task.abort();
    if let Err(err) = client.deregister(worker_id).await {
        warn!(worker_id, error = %err, "deregister failed during shutdown");
    }
    result
}

async fn poll_loop(
    client: &dyn WorkerClient,
    backend: &dyn RenderBackend,
    config: &WorkerLoopConfig,
    worker_id: i64,
    shutdown: &CancellationToken,
) -> clm_protocol::ProtocolResult<()> {
    loop {
        if shutdown.is_cancelled() {
            return Ok(());
        }

        let job = tokio::select! {
            job = client.poll(config.job_type, worker_id, config.poll_wait) => job?,
            _ = shutdown.cancelled() => return Ok(()),
        };

        let Some(job) = job else {
            continue;
        };

        info!(worker_id, job_id = job.id, "claimed job");
        let outcome = match tokio::time::timeout(config.max_job_time, backend.render(&job.payload)).await {
            Ok(result) => result,
            Err(_) => Err(StructuredError {
                error_class: "WorkerTimeoutError".to_string(),
                message: format!(
                    "render exceeded max_job_time of {:?}",
                    config.max_job_time
                ),
                category_hint: Some("infrastructure".to_string()),
                ..Default::default()
            }),
        };

        match outcome {
            Ok(outcome) => {
                client
                    .report_success(job.id, worker_id, &job.content_hash, outcome.cell_outputs)
                    .await?;
            }
            Err(structured_error) => {
                error!(worker_id, job_id = job.id, error_class = %structured_error.error_class, "render failed");
                client
                    .report_failure(job.id, worker_id, structured_error)
                    .await?;
            }
        }
    }
}
