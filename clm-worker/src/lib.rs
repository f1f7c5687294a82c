pub mod backend;
pub mod loop_;

pub use backend::{RenderBackend, RenderOutcome, SimulatedRenderBackend};
pub use loop_::{run, WorkerLoopConfig};

#[cfg(test)]
test_r::enable!();
