pub mod build;
pub mod categorizer;
pub mod graph;
pub mod reporter;
pub mod scheduler;

pub use build::{BuildReport, BuildRun};
pub use categorizer::categorize;
pub use graph::{build_operations, job_type_for, stages, Operation};
pub use reporter::{exit_code, ReportMode, Reporter, StageProgress};
pub use scheduler::{Scheduler, StageOutcome};

#[cfg(test)]
test_r::enable!();
