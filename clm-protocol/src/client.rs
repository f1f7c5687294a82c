//! The capability a worker process needs from the engine, independent of
//! transport (spec.md §4.2). `DirectExecutor`-spawned workers run on the
//! same host as the store and use [`DirectClient`]; `ContainerizedExecutor`
//! workers cross a container boundary and use [`ProxiedClient`] against the
//! loopback sidecar instead.

use crate::error::ProtocolResult;
use crate::wire::WireJob;
use async_trait::async_trait;
use clm_common::{ExecutionMode, JobType, StructuredError};
use std::time::Duration;

#[async_trait]
pub trait WorkerClient: Send + Sync {
    async fn register(
        &self,
        worker_type: JobType,
        execution_mode: ExecutionMode,
        executor_id: &str,
    ) -> ProtocolResult<i64>;

    async fn poll(
        &self,
        worker_type: JobType,
        worker_id: i64,
        wait_up_to: Duration,
    ) -> ProtocolResult<Option<WireJob>>;

    async fn heartbeat(&self, worker_id: i64) -> ProtocolResult<()>;

    /// `content_hash` keys the result cache; `cell_outputs` is only `Some`
    /// for cache-populating operations (spec.md §4.8) and otherwise ignored.
    async fn report_success(
        &self,
        job_id: i64,
        worker_id: i64,
        content_hash: &str,
        cell_outputs: Option<serde_json::Value>,
    ) -> ProtocolResult<()>;

    async fn report_failure(
        &self,
        job_id: i64,
        worker_id: i64,
        error: StructuredError,
    ) -> ProtocolResult<()>;

    async fn deregister(&self, worker_id: i64) -> ProtocolResult<()>;
}
