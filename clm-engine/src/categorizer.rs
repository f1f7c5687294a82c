//! Error Categorizer (spec.md §4.9, §7): turns a worker's `StructuredError`
//! into a `BuildError` with a stable `ErrorKind`, `ErrorCategory`, and
//! `ErrorSeverity`, following a fixed priority chain so a given
//! `error_class` always lands in the same bucket regardless of message
//! text.

use clm_common::{BuildError, ErrorCategory, ErrorKind, ErrorSeverity, JobType, StructuredError};
use regex::Regex;
use std::sync::OnceLock;

/// Priority-ordered: the first predicate that matches wins. `category_hint`
/// (set by the worker itself) is checked first so a worker's own judgement
/// about user vs. infrastructure fault is never overridden by a guess based
/// on `error_class` substrings.
pub fn categorize(job_type: JobType, error: &StructuredError) -> BuildError {
    let kind = classify_kind(job_type, error);
    let category = classify_category(&kind, error);
    let severity = classify_severity(&kind, &category);

    let (cell_index, snippet) = match error.cell_index {
        Some(tracked) => (Some(tracked), error.cell_source.clone()),
        None => {
            let (extracted_index, extracted_snippet) = extract_cell_context(&error.message);
            (extracted_index, error.cell_source.clone().or(extracted_snippet))
        }
    };

    BuildError {
        category,
        kind,
        severity,
        actionable_hint: actionable_hint(&kind),
        file: None,
        cell_index,
        snippet,
        message: error.message.clone(),
        job_id: None,
        correlation_id: None,
    }
}

/// Falls back to an anchored pattern over the message when the worker
/// didn't tag `cell_index` at the execution boundary itself (spec.md §4.9).
/// Looks for a `cell <n>` marker and takes a bounded snippet (at most 5
/// lines) starting at that marker.
fn extract_cell_context(message: &str) -> (Option<u32>, Option<String>) {
    static CELL_MARKER: OnceLock<Regex> = OnceLock::new();
    let re = CELL_MARKER.get_or_init(|| Regex::new(r"(?i)\bcell\s*\[?#?\s*(\d+)\]?\b").unwrap());

    let Some(caps) = re.captures(message) else {
        return (None, None);
    };
    let cell_index = caps.get(1).and_then(|m| m.as_str().parse().ok());
    let marker_start = caps.get(0).map(|m| m.start()).unwrap_or(0);

    let snippet = message[marker_start..]
        .lines()
        .take(5)
        .collect::<Vec<_>>()
        .join("\n");

    (cell_index, Some(snippet))
}

fn classify_kind(job_type: JobType, error: &StructuredError) -> ErrorKind {
    let class = error.error_class.to_lowercase();

    if class.contains("timeout") {
        return ErrorKind::WorkerTimeout;
    }
    if class.contains("missingtool") || class.contains("executablenotfound") {
        return ErrorKind::MissingTool;
    }
    if class.contains("missingimage") {
        return ErrorKind::MissingImage;
    }
    if class.contains("unusablepath") || class.contains("invalidpath") {
        return ErrorKind::UnusablePath;
    }
    if class.contains("duplicatetarget") {
        return ErrorKind::DuplicateTarget;
    }

    match job_type {
        JobType::Notebook => {
            if class.contains("compil") || class.contains("syntax") {
                ErrorKind::NotebookCompilation
            } else if class.contains("processing") || class.contains("format") {
                ErrorKind::NotebookProcessing
            } else {
                ErrorKind::NotebookRuntime
            }
        }
        JobType::Plantuml | JobType::Drawio => ErrorKind::DiagramSyntax,
    }
}

fn classify_category(kind: &ErrorKind, error: &StructuredError) -> ErrorCategory {
    if let Some(hint) = error.category_hint.as_deref() {
        match hint {
            "user" => return ErrorCategory::User,
            "configuration" => return ErrorCategory::Configuration,
            "infrastructure" => return ErrorCategory::Infrastructure,
            _ => {}
        }
    }

    match kind {
        ErrorKind::NotebookCompilation
        | ErrorKind::NotebookRuntime
        | ErrorKind::DiagramSyntax
        | ErrorKind::SpecValidationSemantic => ErrorCategory::User,
        ErrorKind::MissingTool
        | ErrorKind::MissingImage
        | ErrorKind::UnusablePath
        | ErrorKind::DuplicateTarget
        | ErrorKind::UnknownWorkerType => ErrorCategory::Configuration,
        ErrorKind::NotebookProcessing
        | ErrorKind::NoWorkersAvailable
        | ErrorKind::WorkerTimeout
        | ErrorKind::WorkerDied
        | ErrorKind::QueueBusy
        | ErrorKind::StorageCorrupt
        | ErrorKind::RegistrationFailed
        | ErrorKind::Interrupted => ErrorCategory::Infrastructure,
    }
}

fn classify_severity(kind: &ErrorKind, category: &ErrorCategory) -> ErrorSeverity {
    match kind {
        ErrorKind::StorageCorrupt | ErrorKind::QueueBusy => ErrorSeverity::Fatal,
        _ if *category == ErrorCategory::User => ErrorSeverity::Error,
        _ => ErrorSeverity::Warning,
    }
}

fn actionable_hint(kind: &ErrorKind) -> String {
    match kind {
        ErrorKind::NotebookCompilation => "fix the notebook cell that failed to compile".into(),
        ErrorKind::NotebookRuntime => "fix the exception raised while executing the notebook".into(),
        ErrorKind::NotebookProcessing => "check the notebook's output formatting pipeline".into(),
        ErrorKind::DiagramSyntax => "fix the diagram source syntax".into(),
        ErrorKind::SpecValidationSemantic => "fix the invalid target/course specification".into(),
        ErrorKind::MissingTool => "install the missing external tool and retry".into(),
        ErrorKind::MissingImage => "build or pull the missing worker image".into(),
        ErrorKind::UnusablePath => "use a path the worker can actually read or mount".into(),
        ErrorKind::DuplicateTarget => "rename one of the conflicting output targets".into(),
        ErrorKind::UnknownWorkerType => "register a worker for this job type".into(),
        ErrorKind::NoWorkersAvailable => "start at least one worker of this type".into(),
        ErrorKind::WorkerTimeout => "investigate why the worker is slower than max_job_time".into(),
        ErrorKind::WorkerDied => "check the worker's logs for a crash".into(),
        ErrorKind::QueueBusy => "retry once the store is no longer contended".into(),
        ErrorKind::StorageCorrupt => "restore the store from backup or delete it to rebuild".into(),
        ErrorKind::RegistrationFailed => "check why the worker could not register with the store".into(),
        ErrorKind::Interrupted => "re-run the build; interrupted jobs were requeued".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_r::test;

    fn error(class: &str, hint: Option<&str>) -> StructuredError {
        StructuredError {
            error_class: class.to_string(),
            message: "boom".to_string(),
            category_hint: hint.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn worker_category_hint_wins_over_kind_based_default() {
        let err = error("NotebookCompilationError", Some("infrastructure"));
        let built = categorize(JobType::Notebook, &err);
        assert_eq!(built.category, ErrorCategory::Infrastructure);
    }

    #[test]
    fn unhinted_timeout_is_infrastructure_and_not_fatal() {
        let err = error("WorkerTimeoutError", None);
        let built = categorize(JobType::Notebook, &err);
        assert_eq!(built.kind, ErrorKind::WorkerTimeout);
        assert_eq!(built.category, ErrorCategory::Infrastructure);
        assert!(!built.is_fatal());
    }

    #[test]
    fn storage_corrupt_is_always_fatal() {
        let err = error("StorageCorruptError", Some("user"));
        let built = categorize(JobType::Notebook, &err);
        assert!(built.is_fatal());
    }

    #[test]
    fn plain_diagram_error_defaults_to_user_category() {
        let err = error("ParseError", None);
        let built = categorize(JobType::Plantuml, &err);
        assert_eq!(built.kind, ErrorKind::DiagramSyntax);
        assert_eq!(built.category, ErrorCategory::User);
    }

    #[test]
    fn untracked_cell_index_is_recovered_from_the_message_with_a_bounded_snippet() {
        let err = StructuredError {
            error_class: "NotebookCompilationError".to_string(),
            message: "Cell 3: error: expected ';' before '}' token\n  42 | return x\n  43 | }\nnote: in expansion of macro\nnote: compiling translation unit\nnote: link step skipped".to_string(),
            ..Default::default()
        };
        let built = categorize(JobType::Notebook, &err);
        assert_eq!(built.cell_index, Some(3));
        let snippet = built.snippet.expect("snippet should be extracted");
        assert!(snippet.lines().count() <= 5);
        assert!(snippet.starts_with("Cell 3"));
    }

    #[test]
    fn a_tracked_cell_index_is_never_overridden_by_the_message_fallback() {
        let err = StructuredError {
            error_class: "NotebookCompilationError".to_string(),
            cell_index: Some(7),
            cell_source: Some("x = 1".to_string()),
            message: "cell 1: unrelated mention".to_string(),
            ..Default::default()
        };
        let built = categorize(JobType::Notebook, &err);
        assert_eq!(built.cell_index, Some(7));
        assert_eq!(built.snippet.as_deref(), Some("x = 1"));
    }
}
