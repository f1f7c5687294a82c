//! Row types for the four tables owned by the store (spec.md §3).

use chrono::{DateTime, Utc};
use clm_common::{JobStatus, JobType, StructuredError, WorkerStatus};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;

#[derive(Debug, Clone, FromRow)]
pub struct JobRow {
    pub id: i64,
    pub job_type: String,
    pub status: String,
    pub input_file: String,
    pub output_file: String,
    pub content_hash: String,
    pub payload: String,
    pub priority: i64,
    pub correlation_id: String,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub worker_id: Option<i64>,
    pub error: Option<String>,
    pub attempt_count: i64,
    pub stage: i64,
}

/// The typed, decoded view of a `jobs` row handed back to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub job_type: JobType,
    pub status: JobStatus,
    pub input_file: String,
    pub output_file: String,
    pub content_hash: String,
    pub payload: serde_json::Value,
    pub priority: i64,
    pub correlation_id: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub worker_id: Option<i64>,
    pub error: Option<StructuredError>,
    pub attempt_count: i64,
    pub stage: i64,
}

impl TryFrom<JobRow> for Job {
    type Error = serde_json::Error;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(Job {
            id: row.id,
            job_type: JobType::from_str(&row.job_type).unwrap_or(JobType::Notebook),
            status: JobStatus::from_str(&row.status).unwrap_or(JobStatus::Failed),
            input_file: row.input_file,
            output_file: row.output_file,
            content_hash: row.content_hash,
            payload: serde_json::from_str(&row.payload)?,
            priority: row.priority,
            correlation_id: row.correlation_id,
            created_at: parse_ts(&row.created_at),
            started_at: row.started_at.as_deref().map(parse_ts),
            completed_at: row.completed_at.as_deref().map(parse_ts),
            worker_id: row.worker_id,
            error: row
                .error
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            attempt_count: row.attempt_count,
            stage: row.stage,
        })
    }
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[derive(Debug, Clone, FromRow)]
pub struct WorkerRow {
    pub id: i64,
    pub worker_type: String,
    pub execution_mode: String,
    pub executor_id: String,
    pub status: String,
    pub last_heartbeat: String,
    pub jobs_processed: i64,
    pub jobs_failed: i64,
    pub avg_duration_ms: f64,
    pub started_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    pub id: i64,
    pub worker_type: JobType,
    pub execution_mode: clm_common::ExecutionMode,
    pub executor_id: String,
    pub status: WorkerStatus,
    pub last_heartbeat: DateTime<Utc>,
    pub jobs_processed: i64,
    pub jobs_failed: i64,
    pub avg_duration_ms: f64,
    pub started_at: DateTime<Utc>,
}

impl From<WorkerRow> for Worker {
    fn from(row: WorkerRow) -> Self {
        Worker {
            id: row.id,
            worker_type: JobType::from_str(&row.worker_type).unwrap_or(JobType::Notebook),
            execution_mode: clm_common::ExecutionMode::from_str(&row.execution_mode)
                .unwrap_or(clm_common::ExecutionMode::Direct),
            executor_id: row.executor_id,
            status: WorkerStatus::from_str(&row.status).unwrap_or(WorkerStatus::Dead),
            last_heartbeat: parse_ts(&row.last_heartbeat),
            jobs_processed: row.jobs_processed,
            jobs_failed: row.jobs_failed,
            avg_duration_ms: row.avg_duration_ms,
            started_at: parse_ts(&row.started_at),
        }
    }
}

/// A result cache entry (spec.md §3, §4.8). Either `artifact_path` or
/// `artifact_bytes` is populated depending on whether the producing
/// operation wrote to the workspace or returned inline bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub content_hash: String,
    pub artifact_path: Option<String>,
    pub artifact_bytes: Option<Vec<u8>>,
    pub cell_outputs: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub size_bytes: i64,
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct CacheRow {
    pub content_hash: String,
    pub artifact_path: Option<String>,
    pub artifact_bytes: Option<Vec<u8>>,
    pub cell_outputs: Option<String>,
    pub created_at: String,
    pub last_accessed_at: String,
    pub size_bytes: i64,
}

impl From<CacheRow> for CacheEntry {
    fn from(row: CacheRow) -> Self {
        CacheEntry {
            content_hash: row.content_hash,
            artifact_path: row.artifact_path,
            artifact_bytes: row.artifact_bytes,
            cell_outputs: row
                .cell_outputs
                .as_deref()
                .and_then(|s| serde_json::from_str(s).ok()),
            created_at: parse_ts(&row.created_at),
            last_accessed_at: parse_ts(&row.last_accessed_at),
            size_bytes: row.size_bytes,
        }
    }
}

/// Structured append-only event log entry (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub ts: DateTime<Utc>,
    pub kind: String,
    pub payload: serde_json::Value,
}
