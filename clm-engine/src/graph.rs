//! Operation Graph (spec.md §4.5): enumerates every (language, format,
//! kind) rendering an `OutputTarget` admits for a course file into stages,
//! and (spec.md §4.6) inserts the implicit executions a cache-consuming
//! operation needs before it can run.

use clm_common::{cache_provider, execution_requirement, ExecutionRequirement};
use clm_common::{Format, JobType, Kind, Language, OutputTarget};
use std::path::{Path, PathBuf};

/// `content_hash` mixes the source file's bytes with every parameter that
/// changes the rendered artifact, so unrelated operations over the same
/// input never collide in the result cache (spec.md §3, §4.8).
fn fingerprint(input_file: &Path, language: Language, format: Format, kind: Kind) -> String {
    let mut hasher = blake3::Hasher::new();
    if let Ok(bytes) = std::fs::read(input_file) {
        hasher.update(&bytes);
    } else {
        hasher.update(input_file.to_string_lossy().as_bytes());
    }
    hasher.update(language.to_string().as_bytes());
    hasher.update(format.to_string().as_bytes());
    hasher.update(kind.to_string().as_bytes());
    hasher.finalize().to_hex().to_string()
}

pub fn job_type_for(input_file: &Path) -> Option<JobType> {
    match input_file.extension().and_then(|e| e.to_str()) {
        Some("ipynb") => Some(JobType::Notebook),
        Some("puml") | Some("plantuml") => Some(JobType::Plantuml),
        Some("drawio") => Some(JobType::Drawio),
        _ => None,
    }
}

/// One planned rendering. `stage` controls ordering within a build:
/// stage 1 operations need nothing else from this graph; stage 2 populates
/// the result cache; stage 3 consumes it (spec.md §4.5, §4.6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub input_file: PathBuf,
    pub output_file: PathBuf,
    pub job_type: JobType,
    pub language: Language,
    pub format: Format,
    pub kind: Kind,
    pub target_name: String,
    pub stage: u8,
    pub content_hash: String,
    /// Set for the auto-inserted producing execution of a `ReusesCache`
    /// tuple (spec.md §4.6). Implicit executions populate the result cache
    /// but must never materialize a file under any target's root.
    pub implicit: bool,
    /// For a `ReusesCache` consumer, the content hash of the producing
    /// execution its render should read through from, rather than the
    /// hash it fingerprints for its own (format, kind) (spec.md §4.8).
    pub cache_lookup_hash: Option<String>,
}

impl Operation {
    fn output_path(target: &OutputTarget, input_file: &Path, language: Language, format: Format, kind: Kind) -> PathBuf {
        let stem = input_file
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "output".to_string());
        let ext = match format {
            Format::Html => "html",
            Format::Notebook => "ipynb",
            Format::Code => "py",
        };
        target
            .output_root
            .join(language.to_string())
            .join(kind.to_string())
            .join(format!("{stem}.{ext}"))
    }
}

/// Builds every operation a single course file needs across every admitted
/// target, inserting implicit cache-populating operations exactly once per
/// (input_file, language) pair even if several targets need them.
pub fn build_operations(input_file: &Path, targets: &[OutputTarget]) -> Vec<Operation> {
    let Some(job_type) = job_type_for(input_file) else {
        return Vec::new();
    };

    let mut ops: Vec<Operation> = Vec::new();
    let mut seen_populate: std::collections::HashSet<(Language, Format, Kind)> =
        std::collections::HashSet::new();

    for target in targets {
        for (language, format, kind) in target.admitted_tuples() {
            match execution_requirement(format, kind) {
                ExecutionRequirement::ReusesCache => {
                    let provider = cache_provider(format, kind);
                    if let Some((p_format, p_kind)) = provider {
                        if seen_populate.insert((language, p_format, p_kind)) {
                            ops.push(Operation {
                                input_file: input_file.to_path_buf(),
                                output_file: Operation::output_path(
                                    target, input_file, language, p_format, p_kind,
                                ),
                                job_type,
                                language,
                                format: p_format,
                                kind: p_kind,
                                target_name: target.name.clone(),
                                stage: 2,
                                content_hash: fingerprint(input_file, language, p_format, p_kind),
                                implicit: true,
                                cache_lookup_hash: None,
                            });
                        }
                    }
                    ops.push(Operation {
                        input_file: input_file.to_path_buf(),
                        output_file: Operation::output_path(target, input_file, language, format, kind),
                        job_type,
                        language,
                        format,
                        kind,
                        target_name: target.name.clone(),
                        stage: 3,
                        content_hash: fingerprint(input_file, language, format, kind),
                        implicit: false,
                        cache_lookup_hash: provider
                            .map(|(p_format, p_kind)| fingerprint(input_file, language, p_format, p_kind)),
                    });
                }
                ExecutionRequirement::PopulatesCache => {
                    if seen_populate.insert((language, format, kind)) {
                        ops.push(Operation {
                            input_file: input_file.to_path_buf(),
                            output_file: Operation::output_path(target, input_file, language, format, kind),
                            job_type,
                            language,
                            format,
                            kind,
                            target_name: target.name.clone(),
                            stage: 2,
                            content_hash: fingerprint(input_file, language, format, kind),
                            implicit: false,
                            cache_lookup_hash: None,
                        });
                    }
                }
                ExecutionRequirement::None => {
                    ops.push(Operation {
                        input_file: input_file.to_path_buf(),
                        output_file: Operation::output_path(target, input_file, language, format, kind),
                        job_type,
                        language,
                        format,
                        kind,
                        target_name: target.name.clone(),
                        stage: 1,
                        content_hash: fingerprint(input_file, language, format, kind),
                        implicit: false,
                        cache_lookup_hash: None,
                    });
                }
            }
        }
    }

    ops
}

/// Groups operations by stage in ascending order, the unit the scheduler
/// drains one barrier at a time (spec.md §4.5, §4.7).
pub fn stages(mut ops: Vec<Operation>) -> Vec<(u8, Vec<Operation>)> {
    ops.sort_by_key(|op| op.stage);
    let mut grouped: Vec<(u8, Vec<Operation>)> = Vec::new();
    for op in ops {
        match grouped.last_mut() {
            Some((stage, group)) if *stage == op.stage => group.push(op),
            _ => grouped.push((op.stage, vec![op])),
        }
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use clm_common::OutputTarget;
    use test_r::test;

    fn target(kinds: Option<Vec<Kind>>) -> OutputTarget {
        OutputTarget {
            name: "default".to_string(),
            output_root: PathBuf::from("/out"),
            kinds,
            formats: Some(vec![Format::Html]),
            languages: Some(vec![Language::En]),
        }
    }

    #[test]
    fn completed_kind_inserts_a_stage_2_speaker_op_before_its_stage_3_op() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("01-intro.ipynb");
        std::fs::write(&input, b"{}").unwrap();

        let targets = vec![target(Some(vec![Kind::Completed]))];
        let ops = build_operations(&input, &targets);

        assert_eq!(ops.len(), 2, "completed must pull in its speaker dependency");
        let staged = stages(ops);
        assert_eq!(staged[0].0, 2);
        assert_eq!(staged[0].1[0].kind, Kind::Speaker);
        assert_eq!(staged[1].0, 3);
        assert_eq!(staged[1].1[0].kind, Kind::Completed);
    }

    #[test]
    fn code_along_html_needs_no_implicit_execution() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("01-intro.ipynb");
        std::fs::write(&input, b"{}").unwrap();

        let targets = vec![target(Some(vec![Kind::CodeAlong]))];
        let ops = build_operations(&input, &targets);
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].stage, 1);
    }

    #[test]
    fn shared_speaker_dependency_is_only_scheduled_once() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("01-intro.ipynb");
        std::fs::write(&input, b"{}").unwrap();

        let targets = vec![
            target(Some(vec![Kind::Completed])),
            OutputTarget {
                name: "second".to_string(),
                ..target(Some(vec![Kind::Completed]))
            },
        ];
        let ops = build_operations(&input, &targets);
        let speaker_ops = ops.iter().filter(|o| o.kind == Kind::Speaker).count();
        assert_eq!(speaker_ops, 1);
    }

    #[test]
    fn the_implicit_producer_op_is_flagged_and_the_consumer_looks_up_its_hash() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("01-intro.ipynb");
        std::fs::write(&input, b"{}").unwrap();

        let targets = vec![target(Some(vec![Kind::Completed]))];
        let ops = build_operations(&input, &targets);

        let producer = ops.iter().find(|o| o.kind == Kind::Speaker).unwrap();
        assert!(producer.implicit, "auto-inserted producer must be implicit");
        assert!(producer.cache_lookup_hash.is_none());

        let consumer = ops.iter().find(|o| o.kind == Kind::Completed).unwrap();
        assert!(!consumer.implicit);
        assert_eq!(
            consumer.cache_lookup_hash.as_deref(),
            Some(producer.content_hash.as_str()),
            "consumer must key its cache lookup on the producer's hash"
        );
    }

    #[test]
    fn an_explicitly_admitted_populating_op_is_not_implicit() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("01-intro.ipynb");
        std::fs::write(&input, b"{}").unwrap();

        let targets = vec![target(Some(vec![Kind::Speaker]))];
        let ops = build_operations(&input, &targets);

        assert_eq!(ops.len(), 1);
        assert!(!ops[0].implicit, "an explicitly requested target must still materialize");
    }

    #[test]
    fn non_notebook_extension_yields_no_operations() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("README.md");
        std::fs::write(&input, b"hello").unwrap();
        let targets = vec![target(None)];
        assert!(build_operations(&input, &targets).is_empty());
    }
}
