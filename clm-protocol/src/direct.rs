use crate::client::WorkerClient;
use crate::error::ProtocolResult;
use crate::wire::WireJob;
use async_trait::async_trait;
use clm_common::{ExecutionMode, JobType, StructuredError};
use clm_store::Store;
use std::sync::Arc;
use std::time::Duration;

/// Talks to the [`Store`] directly, in-process. Used by workers started
/// through the `DirectExecutor`, which run on the same host as the engine
/// and can open the SQLite file themselves.
pub struct DirectClient {
    store: Arc<Store>,
}

impl DirectClient {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }
}

pub(crate) fn job_to_wire(job: clm_store::Job) -> serde_json::Result<WireJob> {
    Ok(WireJob {
        id: job.id,
        job_type: job.job_type,
        input_file: job.input_file,
        output_file: job.output_file,
        content_hash: job.content_hash,
        payload: serde_json::from_value(job.payload)?,
        attempt_count: job.attempt_count,
    })
}

/// Shared by `DirectClient` and the sidecar's HTTP handler (spec.md §4.8):
/// a worker reports cell outputs only for cache-populating operations, so
/// the byte budget is just the serialized size of what it actually sent.
pub(crate) async fn cache_put_cell_outputs(
    store: &Store,
    content_hash: &str,
    cell_outputs: &serde_json::Value,
) -> clm_store::StoreResult<()> {
    let size_bytes = serde_json::to_vec(cell_outputs)
        .map(|bytes| bytes.len() as i64)
        .unwrap_or(0);
    store
        .cache_put(content_hash, None, None, Some(cell_outputs), size_bytes)
        .await
}

#[async_trait]
impl WorkerClient for DirectClient {
    async fn register(
        &self,
        worker_type: JobType,
        execution_mode: ExecutionMode,
        executor_id: &str,
    ) -> ProtocolResult<i64> {
        Ok(self
            .store
            .register_worker(worker_type, execution_mode, executor_id)
            .await?)
    }

    async fn poll(
        &self,
        worker_type: JobType,
        worker_id: i64,
        wait_up_to: Duration,
    ) -> ProtocolResult<Option<WireJob>> {
        let job = self
            .store
            .claim_next(worker_type, worker_id, wait_up_to)
            .await?;
        Ok(job.map(job_to_wire).transpose()?)
    }

    async fn heartbeat(&self, worker_id: i64) -> ProtocolResult<()> {
        Ok(self.store.heartbeat(worker_id).await?)
    }

    async fn report_success(
        &self,
        job_id: i64,
        worker_id: i64,
        content_hash: &str,
        cell_outputs: Option<serde_json::Value>,
    ) -> ProtocolResult<()> {
        self.store.complete(job_id, worker_id).await?;
        if let Some(cell_outputs) = cell_outputs {
            cache_put_cell_outputs(&self.store, content_hash, &cell_outputs).await?;
        }
        Ok(())
    }

    async fn report_failure(
        &self,
        job_id: i64,
        worker_id: i64,
        error: StructuredError,
    ) -> ProtocolResult<()> {
        Ok(self.store.fail(job_id, worker_id, &error).await?)
    }

    async fn deregister(&self, worker_id: i64) -> ProtocolResult<()> {
        Ok(self.store.deregister_worker(worker_id).await?)
    }
}
