use thiserror::Error;

/// Failure modes of the Job Queue Store (spec.md §4.1). `QueueBusy` and
/// `StorageCorrupt` are fatal and propagate to the scheduler, which aborts
/// the current stage; `JobNotClaimable` is logged and the caller moves on.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("could not acquire the single-writer lock within the busy budget")]
    QueueBusy,

    #[error("job {job_id} is not in a claimable state for this operation")]
    JobNotClaimable { job_id: i64 },

    #[error("the store reported structural damage: {0}")]
    StorageCorrupt(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl StoreError {
    /// `QueueBusy` and `StorageCorrupt` are the two store-level errors the
    /// spec calls fatal; everything else is something the caller can react
    /// to per-job.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::QueueBusy | StoreError::StorageCorrupt(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
