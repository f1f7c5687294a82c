//! Payload shapes that cross the worker/engine boundary (spec.md §4.2). Both
//! transports — direct in-process calls and the HTTP sidecar — move the same
//! JSON-serializable types, so `DirectClient` and `ProxiedClient` behave
//! identically from the worker's point of view.

use clm_common::{JobType, StructuredError, WorkerPayload};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireJob {
    pub id: i64,
    pub job_type: JobType,
    pub input_file: String,
    pub output_file: String,
    pub content_hash: String,
    pub payload: WorkerPayload,
    pub attempt_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub worker_type: JobType,
    pub execution_mode: clm_common::ExecutionMode,
    pub executor_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub worker_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollRequest {
    pub job_type: JobType,
    #[serde(with = "humantime_serde")]
    pub wait_up_to: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollResponse {
    pub job: Option<WireJob>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportFailureRequest {
    pub worker_id: i64,
    pub error: StructuredError,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSuccessRequest {
    pub worker_id: i64,
    /// Key the store's result cache under, for cache-populating operations
    /// (spec.md §4.8). Ignored by the store when `cell_outputs` is `None`.
    pub content_hash: String,
    #[serde(default)]
    pub cell_outputs: Option<serde_json::Value>,
}
