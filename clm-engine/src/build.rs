//! Ties the Operation Graph, Scheduler, and the categorizer/reporter
//! together into a single build run over a set of course files
//! (spec.md §4.5-§4.9). Worker pool startup itself is driven by the CLI
//! layer, which knows the configured worker binaries/images; this module
//! only requires that the pools it's handed already have workers for the
//! job types it's about to submit.

use crate::categorizer::categorize;
use crate::graph::{build_operations, stages};
use crate::reporter::{ReportMode, Reporter, StageProgress};
use crate::scheduler::Scheduler;
use clm_common::{BuildError, ErrorKind, JobStatus, OutputTarget};
use clm_store::Store;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

pub struct BuildRun {
    scheduler: Scheduler,
    store: Arc<Store>,
}

pub struct BuildReport {
    pub errors: Vec<BuildError>,
    pub jobs_succeeded: usize,
    pub jobs_failed: usize,
    pub cache_hits: usize,
}

impl BuildRun {
    pub fn new(store: Arc<Store>, max_concurrency: usize, attempt_cap: u32) -> Self {
        Self {
            scheduler: Scheduler::new(store.clone(), max_concurrency, attempt_cap),
            store,
        }
    }

    pub fn cancellation_token(&self) -> tokio_util::sync::CancellationToken {
        self.scheduler.cancellation_token()
    }

    /// Runs every course file under `course_root` through every admitted
    /// target, stage by stage, reporting progress as each stage drains.
    pub async fn run<W: Write>(
        &self,
        course_files: &[std::path::PathBuf],
        targets: &[OutputTarget],
        reporter: &mut Reporter<W>,
    ) -> clm_store::StoreResult<BuildReport> {
        let mut all_ops = Vec::new();
        for file in course_files {
            all_ops.extend(build_operations(file, targets));
        }

        let mut errors = Vec::new();
        let mut jobs_succeeded = 0;
        let mut jobs_failed = 0;
        let mut cache_hits = 0;

        for (stage, ops) in stages(all_ops) {
            let total = ops.len();
            let outcomes = self.scheduler.run_stage(ops).await?;

            let mut progress = StageProgress {
                stage,
                total,
                ..Default::default()
            };

            for outcome in &outcomes {
                match outcome.status {
                    JobStatus::Succeeded => {
                        progress.succeeded += 1;
                        jobs_succeeded += 1;
                        if outcome.job_id < 0 {
                            progress.cache_hits += 1;
                            cache_hits += 1;
                        }
                    }
                    JobStatus::Failed => {
                        progress.failed += 1;
                        jobs_failed += 1;
                        if let Some(job) = self.store.get_job(outcome.job_id).await? {
                            if let Some(structured) = &job.error {
                                let mut built = categorize(outcome.operation.job_type, structured);
                                built.file = Some(outcome.operation.input_file.clone());
                                built.job_id = Some(outcome.job_id);
                                reporter.error(&built);
                                errors.push(built);
                            }
                        }
                    }
                    JobStatus::Cancelled => {
                        progress.cancelled += 1;
                        errors.push(interrupted_error(&outcome.operation.input_file));
                    }
                    JobStatus::Pending | JobStatus::Processing => {}
                }
            }

            reporter.progress(&progress);

            if self.scheduler.cancellation_token().is_cancelled() {
                break;
            }
        }

        reporter.summary(&errors);
        Ok(BuildReport {
            errors,
            jobs_succeeded,
            jobs_failed,
            cache_hits,
        })
    }
}

fn interrupted_error(file: &Path) -> BuildError {
    BuildError {
        category: clm_common::ErrorCategory::Infrastructure,
        kind: ErrorKind::Interrupted,
        severity: clm_common::ErrorSeverity::Warning,
        actionable_hint: "re-run the build; this job was requeued".to_string(),
        file: Some(file.to_path_buf()),
        cell_index: None,
        snippet: None,
        message: "build was cancelled before this job completed".to_string(),
        job_id: None,
        correlation_id: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clm_common::config::StoreConfig;
    use clm_common::{Format, Kind, Language};
    use test_r::test;

    #[test]
    async fn run_reports_zero_jobs_for_an_empty_course() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            db_path: dir.path().join("t.db"),
            ..Default::default()
        };
        let store = Arc::new(Store::open(config).await.unwrap());
        let run = BuildRun::new(store, 4, 2);
        let mut buf = Vec::new();
        let mut reporter = Reporter::new(ReportMode::Quiet, &mut buf);

        let target = OutputTarget {
            name: "default".to_string(),
            output_root: dir.path().join("out"),
            kinds: Some(vec![Kind::CodeAlong]),
            formats: Some(vec![Format::Html]),
            languages: Some(vec![Language::En]),
        };

        let report = run.run(&[], &[target], &mut reporter).await.unwrap();
        assert_eq!(report.jobs_succeeded, 0);
        assert_eq!(report.jobs_failed, 0);
        assert!(report.errors.is_empty());
    }
}
