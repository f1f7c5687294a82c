//! The Job Queue Store (spec.md §4.1): sole authoritative state for jobs,
//! workers, events, and the result cache. Every mutation goes through a
//! single `SqlitePool` configured for one writer at a time; `claim_next`'s
//! atomic claim is a single `UPDATE ... RETURNING` so exactly one worker can
//! ever hold a given job in `processing`.

use crate::error::{StoreError, StoreResult};
use crate::schema::{CacheEntry, CacheRow, Job, JobRow, Worker, WorkerRow};
use chrono::Utc;
use clm_common::config::{JournalMode, StoreConfig};
use clm_common::{ExecutionMode, JobType, StructuredError};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, warn};

fn job_type_index(jt: JobType) -> usize {
    match jt {
        JobType::Notebook => 0,
        JobType::Plantuml => 1,
        JobType::Drawio => 2,
    }
}

/// Append-only result of a successful job completion, passed by the caller
/// into `complete()`. Kept as a free-form JSON blob because the scheduler
/// doesn't need to interpret it — only the reporter and cache do.
pub type ResultSummary = serde_json::Value;

pub struct Store {
    pool: SqlitePool,
    config: StoreConfig,
    notifiers: [Arc<Notify>; 3],
}

impl Store {
    pub async fn open(config: StoreConfig) -> StoreResult<Self> {
        let journal_mode = match config.journal_mode {
            JournalMode::Wal => "WAL",
            JournalMode::Fallback => "DELETE",
        };

        let options = SqliteConnectOptions::from_str(&format!(
            "sqlite://{}",
            config.db_path.display()
        ))?
        .create_if_missing(true)
        .busy_timeout(config.busy_timeout)
        .pragma("journal_mode", journal_mode)
        .pragma("foreign_keys", "ON");

        // A single writer connection avoids SQLITE_BUSY storms under the
        // concurrent-heartbeat write load described in spec.md §5; readers
        // still fan out across the pool.
        let pool = SqlitePoolOptions::new()
            .max_connections(if matches!(config.journal_mode, JournalMode::Wal) {
                8
            } else {
                1
            })
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self {
            pool,
            config,
            notifiers: [
                Arc::new(Notify::new()),
                Arc::new(Notify::new()),
                Arc::new(Notify::new()),
            ],
        })
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Inserts a pending job. Idempotent in the sense that callers are
    /// expected to have already checked the cache; submitting twice creates
    /// two distinct jobs (the store does not deduplicate by content_hash —
    /// that's the scheduler's job via `cache_get`).
    pub async fn submit(
        &self,
        job_type: JobType,
        input_file: &str,
        output_file: &str,
        payload: &serde_json::Value,
        content_hash: &str,
        priority: i64,
        correlation_id: &str,
    ) -> StoreResult<i64> {
        let now = Utc::now().to_rfc3339();
        let payload_str = serde_json::to_string(payload)?;
        let rec = sqlx::query(
            r#"
            INSERT INTO jobs
                (job_type, status, input_file, output_file, content_hash, payload,
                 priority, correlation_id, created_at, attempt_count, stage)
            VALUES (?, 'pending', ?, ?, ?, ?, ?, ?, ?, 0, 0)
            RETURNING id
            "#,
        )
        .bind(job_type.to_string())
        .bind(input_file)
        .bind(output_file)
        .bind(content_hash)
        .bind(payload_str)
        .bind(priority)
        .bind(correlation_id)
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;

        let job_id: i64 = rec.try_get("id")?;

        self.log_event(
            "job_submitted",
            serde_json::json!({ "job_id": job_id, "job_type": job_type.to_string() }),
        )
        .await?;

        self.notifiers[job_type_index(job_type)].notify_waiters();
        Ok(job_id)
    }

    /// Atomically claims the oldest pending job of `job_type`, FIFO by
    /// `(priority desc, id asc)` (spec.md §4.1, §8 property 6). Suspends up
    /// to `wait_up_to` when nothing is immediately pending.
    pub async fn claim_next(
        &self,
        job_type: JobType,
        worker_id: i64,
        wait_up_to: Duration,
    ) -> StoreResult<Option<Job>> {
        let deadline = tokio::time::Instant::now() + wait_up_to;
        loop {
            if let Some(job) = self.try_claim_once(job_type, worker_id).await? {
                return Ok(Some(job));
            }

            if wait_up_to.is_zero() {
                return Ok(None);
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let remaining = deadline - now;
            let poll = self.config.poll_interval.min(remaining);

            let notified = self.notifiers[job_type_index(job_type)].notified();
            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep(poll) => {}
            }
        }
    }

    async fn try_claim_once(&self, job_type: JobType, worker_id: i64) -> StoreResult<Option<Job>> {
        let now = Utc::now().to_rfc3339();
        let row: Option<JobRow> = sqlx::query_as(
            r#"
            UPDATE jobs
            SET status = 'processing', worker_id = ?, started_at = ?
            WHERE id = (
                SELECT id FROM jobs
                WHERE job_type = ? AND status = 'pending'
                ORDER BY priority DESC, id ASC
                LIMIT 1
            )
            RETURNING id, job_type, status, input_file, output_file, content_hash,
                      payload, priority, correlation_id, created_at, started_at,
                      completed_at, worker_id, error, attempt_count, stage
            "#,
        )
        .bind(worker_id)
        .bind(&now)
        .bind(job_type.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let job = Job::try_from(row)?;
                self.mark_worker_busy(worker_id).await?;
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }

    async fn mark_worker_busy(&self, worker_id: i64) -> StoreResult<()> {
        sqlx::query("UPDATE workers SET status = 'busy' WHERE id = ? AND status != 'dead'")
            .bind(worker_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Requires `status = processing` and a matching `worker_id`; otherwise
    /// returns `JobNotClaimable` (spec.md §4.1 — caller logs and moves on).
    pub async fn complete(&self, job_id: i64, worker_id: i64) -> StoreResult<()> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'succeeded', completed_at = ?
            WHERE id = ? AND status = 'processing' AND worker_id = ?
            "#,
        )
        .bind(&now)
        .bind(job_id)
        .bind(worker_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::JobNotClaimable { job_id });
        }

        sqlx::query(
            "UPDATE workers SET status = 'idle', jobs_processed = jobs_processed + 1 WHERE id = ?",
        )
        .bind(worker_id)
        .execute(&self.pool)
        .await?;

        self.log_event("job_succeeded", serde_json::json!({ "job_id": job_id }))
            .await?;
        Ok(())
    }

    pub async fn fail(
        &self,
        job_id: i64,
        worker_id: i64,
        structured_error: &StructuredError,
    ) -> StoreResult<()> {
        let now = Utc::now().to_rfc3339();
        let error_json = serde_json::to_string(structured_error)?;
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'failed', completed_at = ?, error = ?
            WHERE id = ? AND status = 'processing' AND worker_id = ?
            "#,
        )
        .bind(&now)
        .bind(&error_json)
        .bind(job_id)
        .bind(worker_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::JobNotClaimable { job_id });
        }

        sqlx::query(
            "UPDATE workers SET status = 'idle', jobs_failed = jobs_failed + 1 WHERE id = ?",
        )
        .bind(worker_id)
        .execute(&self.pool)
        .await?;

        self.log_event(
            "job_failed",
            serde_json::json!({ "job_id": job_id, "error_class": structured_error.error_class }),
        )
        .await?;
        Ok(())
    }

    /// Moves an already-`failed` job back to `pending` with a bumped
    /// `attempt_count`, for infrastructure-category failures the scheduler
    /// has decided are worth a retry (spec.md §4.9, §9).
    pub async fn retry_failed(&self, job_id: i64) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'pending', worker_id = NULL, started_at = NULL,
                completed_at = NULL, error = NULL, attempt_count = attempt_count + 1
            WHERE id = ? AND status = 'failed'
            "#,
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::JobNotClaimable { job_id });
        }

        if let Some(job) = self.get_job(job_id).await? {
            self.notifiers[job_type_index(job.job_type)].notify_waiters();
        }
        self.log_event("job_retried", serde_json::json!({ "job_id": job_id }))
            .await?;
        Ok(())
    }

    /// Returns an unclaimed pending job to `pending` with a bumped
    /// `attempt_count` (at-least-once semantics, spec.md §4.4, §8).
    pub async fn requeue_stale(&self, job_id: i64) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'pending', worker_id = NULL, started_at = NULL,
                attempt_count = attempt_count + 1
            WHERE id = ? AND status = 'processing'
            "#,
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        if let Some(job) = self.get_job(job_id).await? {
            self.notifiers[job_type_index(job.job_type)].notify_waiters();
        }
        self.log_event("job_requeued", serde_json::json!({ "job_id": job_id }))
            .await?;
        Ok(())
    }

    /// Marks an unclaimed pending job cancelled (spec.md §4.7
    /// cancellation path, §8 round-trip law).
    pub async fn cancel_pending(&self, job_id: i64) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE jobs SET status = 'cancelled', completed_at = ? WHERE id = ? AND status = 'pending'",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn get_job(&self, job_id: i64) -> StoreResult<Option<Job>> {
        let row: Option<JobRow> = sqlx::query_as("SELECT * FROM jobs WHERE id = ?")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Job::try_from).transpose().map_err(Into::into)
    }

    pub async fn jobs_by_status(&self, status: clm_common::JobStatus) -> StoreResult<Vec<Job>> {
        let rows: Vec<JobRow> = sqlx::query_as("SELECT * FROM jobs WHERE status = ?")
            .bind(status.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(Job::try_from)
            .collect::<Result<_, _>>()
            .map_err(Into::into)
    }

    pub async fn count_in_flight(&self) -> StoreResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) as c FROM jobs WHERE status = 'processing'")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("c")?)
    }

    pub async fn heartbeat(&self, worker_id: i64) -> StoreResult<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE workers SET last_heartbeat = ? WHERE id = ? AND status != 'dead'")
            .bind(&now)
            .bind(worker_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn register_worker(
        &self,
        worker_type: JobType,
        execution_mode: ExecutionMode,
        executor_id: &str,
    ) -> StoreResult<i64> {
        let now = Utc::now().to_rfc3339();
        let rec = sqlx::query(
            r#"
            INSERT INTO workers
                (worker_type, execution_mode, executor_id, status, last_heartbeat, started_at)
            VALUES (?, ?, ?, 'starting', ?, ?)
            RETURNING id
            "#,
        )
        .bind(worker_type.to_string())
        .bind(execution_mode.to_string())
        .bind(executor_id)
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;
        let worker_id: i64 = rec.try_get("id")?;

        self.log_event(
            "worker_registered",
            serde_json::json!({ "worker_id": worker_id, "worker_type": worker_type.to_string() }),
        )
        .await?;
        Ok(worker_id)
    }

    pub async fn mark_worker_ready(&self, worker_id: i64) -> StoreResult<()> {
        sqlx::query("UPDATE workers SET status = 'idle' WHERE id = ? AND status = 'starting'")
            .bind(worker_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn deregister_worker(&self, worker_id: i64) -> StoreResult<()> {
        sqlx::query("UPDATE workers SET status = 'dead' WHERE id = ?")
            .bind(worker_id)
            .execute(&self.pool)
            .await?;
        self.log_event(
            "worker_deregistered",
            serde_json::json!({ "worker_id": worker_id }),
        )
        .await?;
        Ok(())
    }

    pub async fn get_worker(&self, worker_id: i64) -> StoreResult<Option<Worker>> {
        let row: Option<WorkerRow> = sqlx::query_as("SELECT * FROM workers WHERE id = ?")
            .bind(worker_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Worker::from))
    }

    pub async fn workers_by_type(&self, worker_type: JobType) -> StoreResult<Vec<Worker>> {
        let rows: Vec<WorkerRow> = sqlx::query_as("SELECT * FROM workers WHERE worker_type = ?")
            .bind(worker_type.to_string())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Worker::from).collect())
    }

    pub async fn all_workers(&self) -> StoreResult<Vec<Worker>> {
        let rows: Vec<WorkerRow> = sqlx::query_as("SELECT * FROM workers")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Worker::from).collect())
    }

    /// Healthy iff registered, status in {idle, busy}, and heartbeat fresh
    /// within `freshness_window`. Never cached across calls (spec.md §3).
    pub fn is_heartbeat_fresh(worker: &Worker, freshness_window: Duration) -> bool {
        let age = Utc::now().signed_duration_since(worker.last_heartbeat);
        age.to_std().map(|d| d <= freshness_window).unwrap_or(false)
    }

    /// Sweeps workers whose heartbeat has gone stale, marks them dead, and
    /// returns their in-flight jobs to `pending` (spec.md §4.4). Intended to
    /// be combined with an executor liveness check by the caller before
    /// acting on "stale" — the store alone can only see the heartbeat.
    pub async fn stale_workers(&self, freshness_window: Duration) -> StoreResult<Vec<Worker>> {
        let all = self.all_workers().await?;
        Ok(all
            .into_iter()
            .filter(|w| w.status.is_healthy_status())
            .filter(|w| !Self::is_heartbeat_fresh(w, freshness_window))
            .collect())
    }

    pub async fn mark_dead_and_requeue(&self, worker_id: i64) -> StoreResult<usize> {
        sqlx::query("UPDATE workers SET status = 'dead' WHERE id = ?")
            .bind(worker_id)
            .execute(&self.pool)
            .await?;

        let stuck: Vec<JobRow> = sqlx::query_as(
            "SELECT * FROM jobs WHERE worker_id = ? AND status = 'processing'",
        )
        .bind(worker_id)
        .fetch_all(&self.pool)
        .await?;

        for row in &stuck {
            self.requeue_stale(row.id).await?;
        }

        warn!(worker_id, requeued = stuck.len(), "worker marked dead");
        Ok(stuck.len())
    }

    // --- Result cache (spec.md §4.8) ---

    pub async fn cache_get(&self, content_hash: &str) -> StoreResult<Option<CacheEntry>> {
        let row: Option<CacheRow> =
            sqlx::query_as("SELECT * FROM results_cache WHERE content_hash = ?")
                .bind(content_hash)
                .fetch_optional(&self.pool)
                .await?;

        if row.is_some() {
            sqlx::query("UPDATE results_cache SET last_accessed_at = ? WHERE content_hash = ?")
                .bind(Utc::now().to_rfc3339())
                .bind(content_hash)
                .execute(&self.pool)
                .await?;
        }

        Ok(row.map(CacheEntry::from))
    }

    pub async fn cache_put(
        &self,
        content_hash: &str,
        artifact_path: Option<&str>,
        artifact_bytes: Option<&[u8]>,
        cell_outputs: Option<&serde_json::Value>,
        size_bytes: i64,
    ) -> StoreResult<()> {
        let now = Utc::now().to_rfc3339();
        let cell_outputs_str = cell_outputs.map(serde_json::to_string).transpose()?;
        sqlx::query(
            r#"
            INSERT INTO results_cache
                (content_hash, artifact_path, artifact_bytes, cell_outputs, created_at, last_accessed_at, size_bytes)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(content_hash) DO UPDATE SET
                artifact_path = excluded.artifact_path,
                artifact_bytes = excluded.artifact_bytes,
                cell_outputs = excluded.cell_outputs,
                last_accessed_at = excluded.last_accessed_at,
                size_bytes = excluded.size_bytes
            "#,
        )
        .bind(content_hash)
        .bind(artifact_path)
        .bind(artifact_bytes)
        .bind(&cell_outputs_str)
        .bind(&now)
        .bind(&now)
        .bind(size_bytes)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// LRU eviction by access time above `byte_budget`. Intended to run
    /// at-most-once per engine start (spec.md §4.8) — callers are
    /// responsible for only invoking this once per process lifetime.
    pub async fn evict_cache_lru(&self, byte_budget: i64) -> StoreResult<usize> {
        let row = sqlx::query("SELECT COALESCE(SUM(size_bytes), 0) as total FROM results_cache")
            .fetch_one(&self.pool)
            .await?;
        let mut total: i64 = row.try_get("total")?;
        if total <= byte_budget {
            return Ok(0);
        }

        let candidates: Vec<(String, i64)> = sqlx::query(
            "SELECT content_hash, size_bytes FROM results_cache ORDER BY last_accessed_at ASC",
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|r| (r.get("content_hash"), r.get("size_bytes")))
        .collect();

        let mut evicted = 0usize;
        for (hash, size) in candidates {
            if total <= byte_budget {
                break;
            }
            sqlx::query("DELETE FROM results_cache WHERE content_hash = ?")
                .bind(&hash)
                .execute(&self.pool)
                .await?;
            total -= size;
            evicted += 1;
        }
        debug!(evicted, "evicted cache entries to stay under byte budget");
        Ok(evicted)
    }

    // --- Events (spec.md §3) ---

    pub async fn log_event(&self, kind: &str, payload: serde_json::Value) -> StoreResult<()> {
        sqlx::query("INSERT INTO events (ts, kind, payload) VALUES (?, ?, ?)")
            .bind(Utc::now().to_rfc3339())
            .bind(kind)
            .bind(payload.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn recent_events(&self, limit: i64) -> StoreResult<Vec<crate::schema::Event>> {
        let rows = sqlx::query("SELECT id, ts, kind, payload FROM events ORDER BY id DESC LIMIT ?")
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|r| {
                let ts_str: String = r.get("ts");
                let payload_str: String = r.get("payload");
                Ok(crate::schema::Event {
                    id: r.get("id"),
                    ts: chrono::DateTime::parse_from_rfc3339(&ts_str)
                        .map(|d| d.with_timezone(&Utc))
                        .unwrap_or_else(|_| Utc::now()),
                    kind: r.get("kind"),
                    payload: serde_json::from_str(&payload_str)?,
                })
            })
            .collect::<StoreResult<_>>()
    }

    pub fn notify_job_type(&self, job_type: JobType) {
        self.notifiers[job_type_index(job_type)].notify_waiters();
    }
}
