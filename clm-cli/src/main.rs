use clap::Parser;
use clm_cli::cli::{self, Cli, Command, WorkersCommand};
use clm_cli::course;
use clm_cli::workers_state::{
    load as load_workers_state, save as save_workers_state, PersistentWorkerRecord, WorkersState,
};
use clm_common::config::{make_config_loader, EngineConfig};
use clm_common::tracing_setup::{init_tracing, TracingFormat};
use clm_common::{ExecutionMode, JobType};
use clm_engine::{exit_code, BuildRun, Reporter};
use clm_executor::{DirectExecutor, PoolConfig, RunMode, WorkerLaunchSpec, WorkerPool};
use clm_protocol::{DirectClient, WorkerClient};
use clm_store::Store;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config: EngineConfig = make_config_loader(&cli.config).load()?;

    init_tracing(
        &config.log_level,
        match cli.format {
            cli::OutputFormat::StructuredStream => TracingFormat::Json,
            _ => TracingFormat::Pretty,
        },
    );

    let exit_code = match &cli.command {
        Command::Build { watch, target } => {
            run_build(&cli, &config, *watch, target.clone()).await?
        }
        Command::Targets => run_targets(&cli).await?,
        Command::StartServices => run_start_services(&cli, &config).await?,
        Command::StopServices { force } => run_stop_services(&cli, *force).await?,
        Command::Workers { command } => run_workers(&cli, &config, command.clone()).await?,
    };

    std::process::exit(exit_code);
}

fn workers_state_path(cli: &Cli) -> std::path::PathBuf {
    cli.config
        .parent()
        .unwrap_or_else(|| std::path::Path::new("."))
        .join("clm-workers.json")
}

async fn open_store(config: &EngineConfig) -> anyhow::Result<Arc<Store>> {
    Ok(Arc::new(Store::open(config.store.clone()).await?))
}

fn build_pool(config: &EngineConfig, store: Arc<Store>) -> WorkerPool {
    let protocol: Arc<dyn WorkerClient> = Arc::new(DirectClient::new(store.clone()));
    let executor = Arc::new(DirectExecutor::new());
    WorkerPool::new(
        executor,
        store,
        protocol,
        PoolConfig {
            max_worker_startup_concurrency: config.max_worker_startup_concurrency,
            worker_startup_timeout: config.worker_startup_timeout,
            stop_grace_window: config.stop_grace_window,
        },
    )
}

fn launch_spec_for(job_type: JobType) -> WorkerLaunchSpec {
    let binary = match job_type {
        JobType::Notebook => "clm-worker-notebook",
        JobType::Plantuml => "clm-worker-plantuml",
        JobType::Drawio => "clm-worker-drawio",
    };
    WorkerLaunchSpec {
        worker_type: job_type,
        target: binary.to_string(),
        args: Vec::new(),
        working_dir: std::env::current_dir().unwrap_or_else(|_| std::path::PathBuf::from(".")),
        sidecar_addr: String::new(),
    }
}

async fn ensure_worker(pool: &WorkerPool, job_type: JobType, run_mode: RunMode) -> anyhow::Result<()> {
    if !pool.has_worker_of_type(job_type).await? {
        pool.start_worker(launch_spec_for(job_type), ExecutionMode::Direct, run_mode)
            .await?;
    }
    Ok(())
}

async fn run_build(
    cli: &Cli,
    config: &EngineConfig,
    watch: bool,
    target_filter: Vec<String>,
) -> anyhow::Result<i32> {
    let course = course::load_course_config(&cli.course_config)?;
    if let Err(err) = course::validate_no_duplicate_targets(&course.targets) {
        eprintln!("{err}");
        return Ok(exit_code(&[err]));
    }
    let targets: Vec<_> = if target_filter.is_empty() {
        course.targets
    } else {
        course
            .targets
            .into_iter()
            .filter(|t| target_filter.contains(&t.name))
            .collect()
    };

    let store = open_store(config).await?;
    let pool = build_pool(config, store.clone());

    loop {
        let course_files = course::discover_course_files(&course.course_root)?;
        let job_types: std::collections::HashSet<JobType> = course_files
            .iter()
            .filter_map(|f| clm_engine::job_type_for(f))
            .collect();
        for job_type in job_types {
            ensure_worker(&pool, job_type, RunMode::AutoStart).await?;
        }

        let run = BuildRun::new(store.clone(), config.max_concurrency, config.attempt_cap);
        let mut stdout = std::io::stdout();
        let mut reporter = Reporter::new(cli.format.into(), &mut stdout);
        let report = run.run(&course_files, &targets, &mut reporter).await?;

        pool.stop_non_persistent().await?;

        if !watch {
            return Ok(exit_code(&report.errors));
        }

        tokio::time::sleep(config.progress_interval).await;
    }
}

async fn run_targets(cli: &Cli) -> anyhow::Result<i32> {
    let course = course::load_course_config(&cli.course_config)?;
    for target in &course.targets {
        println!("{}", target.name);
        for (language, format, kind) in target.admitted_tuples() {
            println!("  {language}/{format}/{kind}");
        }
    }
    Ok(0)
}

/// Starts one persistent worker per job type and blocks in the foreground
/// until interrupted. The operator is expected to background this process
/// (`clm start-services &`); `stop-services` then signals the recorded pids
/// from a second invocation, since a direct-mode child is only kept alive
/// by this process's own tokio runtime holding its `Child` handle.
async fn run_start_services(cli: &Cli, config: &EngineConfig) -> anyhow::Result<i32> {
    let store = open_store(config).await?;
    let pool = build_pool(config, store.clone());

    let mut records = Vec::new();
    for job_type in clm_common::ALL_JOB_TYPES {
        let worker_id = pool
            .start_worker(launch_spec_for(job_type), ExecutionMode::Direct, RunMode::Persistent)
            .await?;
        let (pid, container_id) = pool.worker_handle(worker_id).await.unwrap_or((None, None));
        let executor_id = store
            .get_worker(worker_id)
            .await?
            .map(|w| w.executor_id)
            .unwrap_or_default();
        records.push(PersistentWorkerRecord {
            worker_id,
            job_type: job_type.to_string(),
            executor_id,
            pid,
            container_id,
        });
    }
    save_workers_state(&workers_state_path(cli), &WorkersState { workers: records })?;

    tracing::info!("worker services started, press ctrl-c to stop");
    tokio::signal::ctrl_c().await?;

    pool.stop_all().await?;
    let _ = std::fs::remove_file(workers_state_path(cli));
    Ok(0)
}

async fn run_stop_services(cli: &Cli, force: bool) -> anyhow::Result<i32> {
    let state = load_workers_state(&workers_state_path(cli))?;
    if state.workers.is_empty() {
        println!("no recorded persistent workers");
        return Ok(0);
    }
    for worker in &state.workers {
        if let Some(pid) = worker.pid {
            signal_pid(pid, force);
        }
        if let Some(container_id) = &worker.container_id {
            let _ = std::process::Command::new("docker")
                .arg("stop")
                .arg(container_id)
                .status();
        }
    }
    save_workers_state(&workers_state_path(cli), &WorkersState::default())?;
    Ok(0)
}

#[cfg(unix)]
fn signal_pid(pid: u32, force: bool) {
    let signal = if force { "-KILL" } else { "-TERM" };
    let _ = std::process::Command::new("kill")
        .arg(signal)
        .arg(pid.to_string())
        .status();
}

#[cfg(not(unix))]
fn signal_pid(_pid: u32, _force: bool) {}

async fn run_workers(cli: &Cli, config: &EngineConfig, command: WorkersCommand) -> anyhow::Result<i32> {
    let store = open_store(config).await?;

    match command {
        WorkersCommand::List { status } => {
            let workers = store.all_workers().await?;
            for worker in workers {
                if let Some(want) = &status {
                    if worker.status.to_string() != *want {
                        continue;
                    }
                }
                println!(
                    "{}\t{}\t{}\t{}",
                    worker.id, worker.worker_type, worker.status, worker.executor_id
                );
            }
            Ok(0)
        }
        WorkersCommand::Cleanup { all, force } => {
            let state = load_workers_state(&workers_state_path(cli))?;
            let stale = store.stale_workers(config.heartbeat_freshness_window).await?;
            let stale_ids: std::collections::HashSet<i64> = stale.iter().map(|w| w.id).collect();

            let mut remaining = Vec::new();
            for record in state.workers {
                let should_reap = all || stale_ids.contains(&record.worker_id);
                if !should_reap {
                    remaining.push(record);
                    continue;
                }
                if let Some(pid) = record.pid {
                    signal_pid(pid, force);
                }
                if let Some(container_id) = &record.container_id {
                    let _ = std::process::Command::new("docker")
                        .arg("stop")
                        .arg(container_id)
                        .status();
                }
                store.deregister_worker(record.worker_id).await?;
            }
            save_workers_state(
                &workers_state_path(cli),
                &WorkersState { workers: remaining },
            )?;
            Ok(0)
        }
    }
}
