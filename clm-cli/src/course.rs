//! Stand-in for the course specification loader (the real XML parser is a
//! separate collaborator, spec.md Non-goals). Reads a flat toml describing
//! the course root and its output targets, and walks the root for
//! renderable files by extension.

use clm_common::config::ConfigLoader;
use clm_common::{BuildError, ErrorCategory, ErrorKind, ErrorSeverity, OutputTarget};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CourseConfig {
    pub course_root: PathBuf,
    pub targets: Vec<OutputTarget>,
}

pub fn load_course_config(path: &Path) -> Result<CourseConfig, figment::Error> {
    ConfigLoader::<CourseConfig>::new(path)
        .with_env_prefix("CLM_COURSE_")
        .load()
}

/// Rejects a course config whose targets collide by name or by
/// `output_root`, before any job is submitted. Two targets sharing an
/// `output_root` would let one target's writes clobber the other's, and two
/// targets sharing a name make `--target` filtering ambiguous.
pub fn validate_no_duplicate_targets(targets: &[OutputTarget]) -> Result<(), BuildError> {
    let mut seen_names = HashSet::new();
    let mut seen_roots = HashSet::new();

    for target in targets {
        if !seen_names.insert(target.name.as_str()) {
            return Err(duplicate_target_error(format!(
                "output target name {:?} is used by more than one target",
                target.name
            )));
        }
        if !seen_roots.insert(target.output_root.as_path()) {
            return Err(duplicate_target_error(format!(
                "output target {:?} shares output_root {} with another target",
                target.name,
                target.output_root.display()
            )));
        }
    }
    Ok(())
}

fn duplicate_target_error(message: String) -> BuildError {
    BuildError {
        category: ErrorCategory::Configuration,
        kind: ErrorKind::DuplicateTarget,
        severity: ErrorSeverity::Fatal,
        actionable_hint: "rename one of the conflicting output targets".to_string(),
        file: None,
        cell_index: None,
        snippet: None,
        message,
        job_id: None,
        correlation_id: None,
    }
}

const RENDERABLE_EXTENSIONS: [&str; 4] = ["ipynb", "puml", "plantuml", "drawio"];

/// Recursively collects every renderable file under `root`. Hidden
/// directories (leading `.`) are skipped, matching the teacher's own
/// convention of ignoring `.git`/`.clm` state directories during scans.
pub fn discover_course_files(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    if !root.exists() {
        return Ok(out);
    }
    walk(root, &mut out)?;
    out.sort();
    Ok(out)
}

fn walk(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_name = entry.file_name();
        let name = file_name.to_string_lossy();
        if name.starts_with('.') {
            continue;
        }
        if path.is_dir() {
            walk(&path, out)?;
        } else if path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| RENDERABLE_EXTENSIONS.contains(&ext))
        {
            out.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_r::test;

    #[test]
    fn discover_finds_renderable_files_and_skips_hidden_dirs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("01-intro.ipynb"), b"{}").unwrap();
        std::fs::write(dir.path().join("notes.md"), b"ignored").unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join(".git").join("02.ipynb"), b"{}").unwrap();
        std::fs::create_dir(dir.path().join("diagrams")).unwrap();
        std::fs::write(dir.path().join("diagrams").join("flow.puml"), b"@startuml").unwrap();

        let found = discover_course_files(dir.path()).unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.iter().any(|p| p.ends_with("01-intro.ipynb")));
        assert!(found.iter().any(|p| p.ends_with("flow.puml")));
    }

    #[test]
    fn discover_on_missing_root_returns_empty() {
        let found = discover_course_files(Path::new("/does/not/exist")).unwrap();
        assert!(found.is_empty());
    }

    fn target(name: &str, output_root: &str) -> OutputTarget {
        OutputTarget {
            name: name.to_string(),
            output_root: PathBuf::from(output_root),
            kinds: None,
            formats: None,
            languages: None,
        }
    }

    #[test]
    fn distinct_targets_validate_cleanly() {
        let targets = vec![target("student", "out/student"), target("speaker", "out/speaker")];
        assert!(validate_no_duplicate_targets(&targets).is_ok());
    }

    #[test]
    fn duplicate_target_name_is_rejected_as_fatal() {
        let targets = vec![target("student", "out/a"), target("student", "out/b")];
        let err = validate_no_duplicate_targets(&targets).unwrap_err();
        assert_eq!(err.kind, ErrorKind::DuplicateTarget);
        assert!(err.is_fatal());
    }

    #[test]
    fn duplicate_output_root_is_rejected_as_fatal() {
        let targets = vec![target("student", "out/shared"), target("speaker", "out/shared")];
        let err = validate_no_duplicate_targets(&targets).unwrap_err();
        assert_eq!(err.kind, ErrorKind::DuplicateTarget);
        assert_eq!(err.category, ErrorCategory::Configuration);
    }
}
