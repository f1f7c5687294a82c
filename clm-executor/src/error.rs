use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("failed to spawn worker process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("docker command failed: {0}")]
    Docker(String),

    #[error("worker did not become healthy within the startup timeout")]
    StartupTimeout,

    #[error("UNC paths cannot be mounted into a container: {0}")]
    UncPathRejected(String),

    #[error("store error: {0}")]
    Store(#[from] clm_store::StoreError),

    #[error("protocol error: {0}")]
    Protocol(#[from] clm_protocol::ProtocolError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ExecutorResult<T> = Result<T, ExecutorError>;
