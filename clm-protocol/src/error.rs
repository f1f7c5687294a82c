use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("store error: {0}")]
    Store(#[from] clm_store::StoreError),

    #[error("sidecar transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("sidecar returned {status}: {body}")]
    SidecarStatus {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("worker {worker_id} is not registered")]
    UnknownWorker { worker_id: i64 },
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
