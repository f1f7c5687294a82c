//! Progress and result reporting (spec.md §4.9, §6). The same build state
//! drives three renderings: a human progress line, a verbose per-job trace,
//! and a structured-stream mode that emits one JSON object per line for
//! tools consuming build output programmatically.

use clm_common::BuildError;
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportMode {
    Default,
    Verbose,
    Quiet,
    StructuredStream,
}

#[derive(Debug, Clone, Default)]
pub struct StageProgress {
    pub stage: u8,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub cache_hits: usize,
}

impl StageProgress {
    pub fn in_flight(&self) -> usize {
        self.total
            .saturating_sub(self.succeeded + self.failed + self.cancelled)
    }
}

#[derive(Debug, Serialize)]
struct StructuredProgressLine<'a> {
    event: &'a str,
    stage: u8,
    total: usize,
    succeeded: usize,
    failed: usize,
    cancelled: usize,
    cache_hits: usize,
}

#[derive(Debug, Serialize)]
struct StructuredErrorLine<'a> {
    event: &'a str,
    category: String,
    kind: String,
    severity: String,
    message: &'a str,
    file: Option<String>,
}

pub struct Reporter<W: Write> {
    mode: ReportMode,
    out: W,
}

impl<W: Write> Reporter<W> {
    pub fn new(mode: ReportMode, out: W) -> Self {
        Self { mode, out }
    }

    pub fn progress(&mut self, progress: &StageProgress) {
        match self.mode {
            ReportMode::Quiet => {}
            ReportMode::StructuredStream => {
                let line = StructuredProgressLine {
                    event: "progress",
                    stage: progress.stage,
                    total: progress.total,
                    succeeded: progress.succeeded,
                    failed: progress.failed,
                    cancelled: progress.cancelled,
                    cache_hits: progress.cache_hits,
                };
                let _ = writeln!(self.out, "{}", serde_json::to_string(&line).unwrap());
            }
            ReportMode::Default => {
                let _ = writeln!(
                    self.out,
                    "stage {}: {}/{} done ({} failed, {} cache hits)",
                    progress.stage,
                    progress.succeeded + progress.failed + progress.cancelled,
                    progress.total,
                    progress.failed,
                    progress.cache_hits,
                );
            }
            ReportMode::Verbose => {
                let _ = writeln!(
                    self.out,
                    "stage {}: {} in flight, {} succeeded, {} failed, {} cancelled, {} cache hits (of {})",
                    progress.stage,
                    progress.in_flight(),
                    progress.succeeded,
                    progress.failed,
                    progress.cancelled,
                    progress.cache_hits,
                    progress.total,
                );
            }
        }
    }

    pub fn error(&mut self, error: &BuildError) {
        if self.mode == ReportMode::Quiet {
            return;
        }
        match self.mode {
            ReportMode::StructuredStream => {
                let line = StructuredErrorLine {
                    event: "error",
                    category: error.category.to_string(),
                    kind: error.kind.to_string(),
                    severity: error.severity.to_string(),
                    message: &error.message,
                    file: error.file.as_ref().map(|p| p.display().to_string()),
                };
                let _ = writeln!(self.out, "{}", serde_json::to_string(&line).unwrap());
            }
            _ => {
                let _ = writeln!(self.out, "{error}");
                if self.mode == ReportMode::Verbose {
                    if let Some(snippet) = &error.snippet {
                        let _ = writeln!(self.out, "    {snippet}");
                    }
                }
            }
        }
    }

    pub fn summary(&mut self, errors: &[BuildError]) {
        if self.mode == ReportMode::Quiet {
            return;
        }
        let fatal = errors.iter().filter(|e| e.is_fatal()).count();
        let _ = writeln!(
            self.out,
            "build finished: {} error(s), {} fatal",
            errors.len(),
            fatal
        );
    }
}

/// Exit code logic (spec.md §6): 0 when nothing failed, 1 when only
/// non-fatal (user/configuration) errors occurred, 2 when any error was
/// fatal (store-level) or the build was interrupted.
pub fn exit_code(errors: &[BuildError]) -> i32 {
    if errors.iter().any(BuildError::is_fatal) {
        2
    } else if !errors.is_empty() {
        1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clm_common::{ErrorCategory, ErrorKind, ErrorSeverity};
    use test_r::test;

    fn error(severity: ErrorSeverity) -> BuildError {
        BuildError {
            category: ErrorCategory::User,
            kind: ErrorKind::NotebookRuntime,
            severity,
            actionable_hint: "fix it".to_string(),
            file: None,
            cell_index: None,
            snippet: None,
            message: "boom".to_string(),
            job_id: None,
            correlation_id: None,
        }
    }

    #[test]
    fn exit_code_is_zero_with_no_errors() {
        assert_eq!(exit_code(&[]), 0);
    }

    #[test]
    fn exit_code_is_one_with_only_non_fatal_errors() {
        assert_eq!(exit_code(&[error(ErrorSeverity::Error)]), 1);
    }

    #[test]
    fn exit_code_is_two_if_any_error_is_fatal() {
        assert_eq!(
            exit_code(&[error(ErrorSeverity::Error), error(ErrorSeverity::Fatal)]),
            2
        );
    }

    #[test]
    fn quiet_mode_writes_nothing() {
        let mut buf = Vec::new();
        let mut reporter = Reporter::new(ReportMode::Quiet, &mut buf);
        reporter.progress(&StageProgress::default());
        reporter.error(&error(ErrorSeverity::Error));
        assert!(buf.is_empty());
    }

    #[test]
    fn structured_stream_mode_emits_one_json_object_per_line() {
        let mut buf = Vec::new();
        let mut reporter = Reporter::new(ReportMode::StructuredStream, &mut buf);
        reporter.progress(&StageProgress {
            stage: 1,
            total: 3,
            succeeded: 1,
            ..Default::default()
        });
        let text = String::from_utf8(buf).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(text.trim()).unwrap();
        assert_eq!(parsed["event"], "progress");
        assert_eq!(parsed["total"], 3);
    }
}
