pub mod containerized;
pub mod direct;
pub mod error;
pub mod executor;
pub mod launch;
pub mod pool;

pub use containerized::ContainerizedExecutor;
pub use direct::DirectExecutor;
pub use error::{ExecutorError, ExecutorResult};
pub use executor::{Executor, RunningWorker};
pub use launch::{to_container_path, WorkerLaunchSpec};
pub use pool::{PoolConfig, RunMode, WorkerPool};

#[cfg(test)]
test_r::enable!();
