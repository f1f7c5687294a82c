//! Scheduler / Backend (spec.md §4.7): submits one stage's operations to
//! the store, waits for them all to reach a terminal status under a global
//! concurrency bound, and reacts to cooperative cancellation.

use crate::categorizer::categorize;
use crate::graph::Operation;
use clm_common::{ErrorCategory, JobStatus, WorkerPayload};
use clm_store::Store;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct StageOutcome {
    pub job_id: i64,
    pub operation: Operation,
    pub status: JobStatus,
}

pub struct Scheduler {
    store: Arc<Store>,
    concurrency: Arc<Semaphore>,
    cancel: CancellationToken,
    cache_hits: AtomicBool,
    attempt_cap: u32,
}

impl Scheduler {
    pub fn new(store: Arc<Store>, max_concurrency: usize, attempt_cap: u32) -> Self {
        Self {
            store,
            concurrency: Arc::new(Semaphore::new(max_concurrency)),
            cancel: CancellationToken::new(),
            cache_hits: AtomicBool::new(false),
            attempt_cap,
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Submits every operation in a stage, skipping ones whose content hash
    /// is already in the result cache (spec.md §4.8). Blocks until every
    /// submitted job reaches a terminal status or cancellation fires.
    pub async fn run_stage(&self, ops: Vec<Operation>) -> clm_store::StoreResult<Vec<StageOutcome>> {
        let mut outcomes = Vec::with_capacity(ops.len());
        let mut pending = Vec::new();

        for op in ops {
            if self.cancel.is_cancelled() {
                break;
            }
            if let Some(_entry) = self.store.cache_get(&op.content_hash).await? {
                self.cache_hits.store(true, Ordering::Relaxed);
                debug!(content_hash = %op.content_hash, "cache hit, skipping render");
                outcomes.push(StageOutcome {
                    job_id: -1,
                    operation: op,
                    status: JobStatus::Succeeded,
                });
                continue;
            }

            let cached_cell_outputs = match &op.cache_lookup_hash {
                Some(hash) => self
                    .store
                    .cache_get(hash)
                    .await?
                    .and_then(|entry| entry.cell_outputs),
                None => None,
            };

            let payload = WorkerPayload {
                input_path: op.input_file.clone(),
                output_path: op.output_file.clone(),
                language: op.language,
                format: op.format,
                kind: op.kind,
                prog_lang: clm_common::ProgLang::Python,
                templates_ref: "default".to_string(),
                fallback_execute: cached_cell_outputs.is_some(),
                target_name: op.target_name.clone(),
                content_hash: op.content_hash.clone(),
                implicit: op.implicit,
                cached_cell_outputs,
            };
            let payload_json = serde_json::to_value(&payload).expect("payload always serializes");

            let job_id = self
                .store
                .submit(
                    op.job_type,
                    &op.input_file.to_string_lossy(),
                    &op.output_file.to_string_lossy(),
                    &payload_json,
                    &op.content_hash,
                    0,
                    &uuid_like_correlation_id(),
                )
                .await?;
            pending.push((job_id, op));
        }

        for (job_id, op) in pending {
            let permit = tokio::select! {
                permit = self.concurrency.acquire() => permit.expect("semaphore never closed"),
                _ = self.cancel.cancelled() => {
                    self.store.cancel_pending(job_id).await.ok();
                    outcomes.push(StageOutcome { job_id, operation: op, status: JobStatus::Cancelled });
                    continue;
                }
            };

            let status = self.await_completion(job_id).await?;
            drop(permit);
            outcomes.push(StageOutcome {
                job_id,
                operation: op,
                status,
            });
        }

        info!(count = outcomes.len(), "stage complete");
        Ok(outcomes)
    }

    /// Waits for a job to reach a terminal status, transparently retrying
    /// infrastructure-category failures up to `attempt_cap` (spec.md §9:
    /// user-category errors never retry, infrastructure errors do).
    async fn await_completion(&self, job_id: i64) -> clm_store::StoreResult<JobStatus> {
        loop {
            if let Some(job) = self.store.get_job(job_id).await? {
                if job.status == JobStatus::Failed {
                    if let Some(error) = &job.error {
                        let built = categorize(job.job_type, error);
                        if built.category == ErrorCategory::Infrastructure
                            && job.attempt_count < self.attempt_cap as i64
                        {
                            self.store.retry_failed(job_id).await?;
                            tokio::time::sleep(Duration::from_millis(200)).await;
                            continue;
                        }
                    }
                    return Ok(JobStatus::Failed);
                }
                if job.status.is_terminal() {
                    return Ok(job.status);
                }
            }
            if self.cancel.is_cancelled() {
                return Ok(JobStatus::Cancelled);
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }

    pub fn any_cache_hit(&self) -> bool {
        self.cache_hits.load(Ordering::Relaxed)
    }
}

fn uuid_like_correlation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
