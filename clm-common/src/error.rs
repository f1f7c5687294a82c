//! Error taxonomy shared across the workspace (spec.md §4.9, §7).
//!
//! `StructuredError` is the wire payload a worker attaches to `fail()`.
//! `BuildError` is what the Error Categorizer (clm-engine) turns it into.
//! Both live here because the store, protocol, and engine crates all need
//! to serialize/deserialize or construct them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Worker error payload (worker -> scheduler), spec.md §6.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StructuredError {
    pub error_class: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cell_index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cell_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    User,
    Configuration,
    Infrastructure,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCategory::User => "user",
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::Infrastructure => "infrastructure",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    Warning,
    Error,
    Fatal,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorSeverity::Warning => "warning",
            ErrorSeverity::Error => "error",
            ErrorSeverity::Fatal => "fatal",
        };
        f.write_str(s)
    }
}

/// Fine-grained error kinds, spec.md §7. Kept as a closed enum (rather than
/// a free-form string) so the categorizer's pattern table and its callers
/// stay exhaustive-checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotebookCompilation,
    NotebookRuntime,
    NotebookProcessing,
    DiagramSyntax,
    SpecValidationSemantic,
    MissingTool,
    MissingImage,
    UnusablePath,
    DuplicateTarget,
    UnknownWorkerType,
    NoWorkersAvailable,
    WorkerTimeout,
    WorkerDied,
    QueueBusy,
    StorageCorrupt,
    RegistrationFailed,
    Interrupted,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::NotebookCompilation => "notebook_compilation",
            ErrorKind::NotebookRuntime => "notebook_runtime",
            ErrorKind::NotebookProcessing => "notebook_processing",
            ErrorKind::DiagramSyntax => "diagram_syntax",
            ErrorKind::SpecValidationSemantic => "spec_validation_semantic",
            ErrorKind::MissingTool => "missing_tool",
            ErrorKind::MissingImage => "missing_image",
            ErrorKind::UnusablePath => "unusable_path",
            ErrorKind::DuplicateTarget => "duplicate_target",
            ErrorKind::UnknownWorkerType => "unknown_worker_type",
            ErrorKind::NoWorkersAvailable => "no_workers_available",
            ErrorKind::WorkerTimeout => "worker_timeout",
            ErrorKind::WorkerDied => "worker_died",
            ErrorKind::QueueBusy => "queue_busy",
            ErrorKind::StorageCorrupt => "storage_corrupt",
            ErrorKind::RegistrationFailed => "registration_failed",
            ErrorKind::Interrupted => "infrastructure/interrupted",
        };
        f.write_str(s)
    }
}

/// A categorized, user-facing build error (spec.md §4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildError {
    pub category: ErrorCategory,
    pub kind: ErrorKind,
    pub severity: ErrorSeverity,
    pub actionable_hint: String,
    pub file: Option<std::path::PathBuf>,
    pub cell_index: Option<u32>,
    pub snippet: Option<String>,
    pub message: String,
    pub job_id: Option<i64>,
    pub correlation_id: Option<String>,
}

impl BuildError {
    pub fn is_fatal(&self) -> bool {
        self.severity == ErrorSeverity::Fatal
    }
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let file = self
            .file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<none>".to_string());
        write!(
            f,
            "[{}] {} ({}): {} — {}",
            self.category, file, self.kind, self.message, self.actionable_hint
        )
    }
}
