//! Core data model shared by the store, protocol, executor, and engine
//! crates: job/worker taxonomy, the (language, format, kind) matrix, output
//! targets, and execution requirements (spec.md §3).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The three kinds of work a worker can claim. Also doubles as the worker's
/// registered `worker_type` — a worker registers for exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Notebook,
    Plantuml,
    Drawio,
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobType::Notebook => "notebook",
            JobType::Plantuml => "plantuml",
            JobType::Drawio => "drawio",
        };
        f.write_str(s)
    }
}

impl FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "notebook" => Ok(JobType::Notebook),
            "plantuml" => Ok(JobType::Plantuml),
            "drawio" => Ok(JobType::Drawio),
            other => Err(format!("unknown job_type: {other}")),
        }
    }
}

pub const ALL_JOB_TYPES: [JobType; 3] = [JobType::Notebook, JobType::Plantuml, JobType::Drawio];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "succeeded" => Ok(JobStatus::Succeeded),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Direct,
    Docker,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionMode::Direct => "direct",
            ExecutionMode::Docker => "docker",
        };
        f.write_str(s)
    }
}

impl FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct" => Ok(ExecutionMode::Direct),
            "docker" => Ok(ExecutionMode::Docker),
            other => Err(format!("unknown execution_mode: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Starting,
    Idle,
    Busy,
    Hung,
    Dead,
}

impl WorkerStatus {
    pub fn is_healthy_status(self) -> bool {
        matches!(self, WorkerStatus::Idle | WorkerStatus::Busy)
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerStatus::Starting => "starting",
            WorkerStatus::Idle => "idle",
            WorkerStatus::Busy => "busy",
            WorkerStatus::Hung => "hung",
            WorkerStatus::Dead => "dead",
        };
        f.write_str(s)
    }
}

impl FromStr for WorkerStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "starting" => Ok(WorkerStatus::Starting),
            "idle" => Ok(WorkerStatus::Idle),
            "busy" => Ok(WorkerStatus::Busy),
            "hung" => Ok(WorkerStatus::Hung),
            "dead" => Ok(WorkerStatus::Dead),
            other => Err(format!("unknown worker status: {other}")),
        }
    }
}

/// Audience-oriented variant of a notebook output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Kind {
    CodeAlong,
    Completed,
    Speaker,
}

impl Kind {
    pub const ALL: [Kind; 3] = [Kind::CodeAlong, Kind::Completed, Kind::Speaker];
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Kind::CodeAlong => "code-along",
            Kind::Completed => "completed",
            Kind::Speaker => "speaker",
        };
        f.write_str(s)
    }
}

impl FromStr for Kind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "code-along" => Ok(Kind::CodeAlong),
            "completed" => Ok(Kind::Completed),
            "speaker" => Ok(Kind::Speaker),
            other => Err(format!("unknown kind: {other}")),
        }
    }
}

/// Structural output type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Format {
    Html,
    Notebook,
    Code,
}

impl Format {
    pub const ALL: [Format; 3] = [Format::Html, Format::Notebook, Format::Code];
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Format::Html => "html",
            Format::Notebook => "notebook",
            Format::Code => "code",
        };
        f.write_str(s)
    }
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "html" => Ok(Format::Html),
            "notebook" => Ok(Format::Notebook),
            "code" => Ok(Format::Code),
            other => Err(format!("unknown format: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    De,
    En,
}

impl Language {
    pub const ALL: [Language; 2] = [Language::De, Language::En];
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Language::De => "de",
            Language::En => "en",
        };
        f.write_str(s)
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "de" => Ok(Language::De),
            "en" => Ok(Language::En),
            other => Err(format!("unknown language: {other}")),
        }
    }
}

/// The three non-trivial execution relationships a (format, kind) pair can
/// have with the result cache (spec.md §3, §4.6). `CACHE_PROVIDERS` below is
/// the open extension point the spec calls for: adding a new cached pair
/// never requires touching the resolver, only this table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionRequirement {
    None,
    PopulatesCache,
    ReusesCache,
}

/// `(format, kind) -> ExecutionRequirement`. Only `(html, speaker)` and
/// `(html, completed)` are non-`None` today.
pub fn execution_requirement(format: Format, kind: Kind) -> ExecutionRequirement {
    match (format, kind) {
        (Format::Html, Kind::Speaker) => ExecutionRequirement::PopulatesCache,
        (Format::Html, Kind::Completed) => ExecutionRequirement::ReusesCache,
        _ => ExecutionRequirement::None,
    }
}

/// For a `ReusesCache` pair, the `(format, kind)` that must populate the
/// cache entry it reads. Extending this table is how a future cached format
/// gets added without changing the resolver (spec.md §4.6).
pub fn cache_provider(consumer_format: Format, consumer_kind: Kind) -> Option<(Format, Kind)> {
    match (consumer_format, consumer_kind) {
        (Format::Html, Kind::Completed) => Some((Format::Html, Kind::Speaker)),
        _ => None,
    }
}

/// A named, path-rooted, filtered subset of the (language, format, kind)
/// matrix (spec.md §3, §6). `None` in a filter means "all".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputTarget {
    pub name: String,
    pub output_root: std::path::PathBuf,
    pub kinds: Option<Vec<Kind>>,
    pub formats: Option<Vec<Format>>,
    pub languages: Option<Vec<Language>>,
}

impl OutputTarget {
    pub fn admits(&self, language: Language, format: Format, kind: Kind) -> bool {
        self.kinds.as_ref().is_none_or(|ks| ks.contains(&kind))
            && self.formats.as_ref().is_none_or(|fs| fs.contains(&format))
            && self
                .languages
                .as_ref()
                .is_none_or(|ls| ls.contains(&language))
    }

    /// The full (language, format, kind) tuples this target admits, used by
    /// the Operation Graph to enumerate operations (spec.md §4.5).
    pub fn admitted_tuples(&self) -> Vec<(Language, Format, Kind)> {
        let mut out = Vec::new();
        for &language in Language::ALL.iter() {
            for &format in Format::ALL.iter() {
                for &kind in Kind::ALL.iter() {
                    if self.admits(language, format, kind) {
                        out.push((language, format, kind));
                    }
                }
            }
        }
        out
    }
}

/// A single worker payload entry (scheduler -> worker), spec.md §6. Workers
/// ignore unknown keys (serde's default behaviour for structs is strict, so
/// the wire type keeps `#[serde(default)]` fields optional and tolerates
/// extra keys only because the worker never round-trips the raw JSON).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerPayload {
    pub input_path: std::path::PathBuf,
    pub output_path: std::path::PathBuf,
    pub language: Language,
    pub format: Format,
    pub kind: Kind,
    pub prog_lang: ProgLang,
    pub templates_ref: String,
    #[serde(default)]
    pub fallback_execute: bool,
    pub target_name: String,
    /// Content-addressed key the worker must call `cache_put` under via
    /// `report_success` once this operation completes (spec.md §4.8).
    pub content_hash: String,
    /// Set for the auto-inserted producing execution a `ReusesCache` tuple
    /// depends on (spec.md §4.6): the worker renders and reports normally,
    /// but must not write `output_path` under any target's root.
    #[serde(default)]
    pub implicit: bool,
    /// Cell outputs recovered from the result cache for a `ReusesCache`
    /// operation whose producer already ran (spec.md §4.8). Set together
    /// with `fallback_execute`; a worker that honours it skips re-executing
    /// the notebook and renders straight from these outputs.
    #[serde(default)]
    pub cached_cell_outputs: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgLang {
    Python,
    Cpp,
    Csharp,
    Java,
    Typescript,
}

impl fmt::Display for ProgLang {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProgLang::Python => "python",
            ProgLang::Cpp => "cpp",
            ProgLang::Csharp => "csharp",
            ProgLang::Java => "java",
            ProgLang::Typescript => "typescript",
        };
        f.write_str(s)
    }
}

impl FromStr for ProgLang {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "python" => Ok(ProgLang::Python),
            "cpp" => Ok(ProgLang::Cpp),
            "csharp" => Ok(ProgLang::Csharp),
            "java" => Ok(ProgLang::Java),
            "typescript" => Ok(ProgLang::Typescript),
            other => Err(format!("unknown prog-lang: {other}")),
        }
    }
}
