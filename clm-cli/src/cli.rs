use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "clm", about = "Course material build orchestrator")]
pub struct Cli {
    /// Path to the engine config toml (defaults, then CLM_ env overrides).
    #[arg(long, global = true, default_value = "clm.toml")]
    pub config: PathBuf,

    /// Path to the course config toml (course root + output targets).
    #[arg(long, global = true, default_value = "course.toml")]
    pub course_config: PathBuf,

    #[arg(long, global = true, value_enum, default_value = "default")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Default,
    Verbose,
    Quiet,
    StructuredStream,
}

impl From<OutputFormat> for clm_engine::ReportMode {
    fn from(value: OutputFormat) -> Self {
        match value {
            OutputFormat::Default => clm_engine::ReportMode::Default,
            OutputFormat::Verbose => clm_engine::ReportMode::Verbose,
            OutputFormat::Quiet => clm_engine::ReportMode::Quiet,
            OutputFormat::StructuredStream => clm_engine::ReportMode::StructuredStream,
        }
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Render every course file through every admitted output target.
    Build {
        /// Re-stat course files every `poll_interval` and re-run on change.
        #[arg(long)]
        watch: bool,
        /// Restrict the build to output targets with these names.
        #[arg(long)]
        target: Vec<String>,
    },
    /// List the configured output targets and the tuples each admits.
    Targets,
    /// Start the persistent/managed worker pools without running a build.
    StartServices,
    /// Stop managed worker pools.
    StopServices {
        /// Also stop persistent workers.
        #[arg(long)]
        force: bool,
    },
    /// Inspect or reap registered workers.
    Workers {
        #[command(subcommand)]
        command: WorkersCommand,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum WorkersCommand {
    /// List registered workers, optionally filtered by status.
    List {
        #[arg(long)]
        status: Option<String>,
    },
    /// Stop and deregister dead or (with --all) every worker.
    Cleanup {
        #[arg(long)]
        all: bool,
        #[arg(long)]
        force: bool,
    },
}
