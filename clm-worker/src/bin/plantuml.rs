//! PlantUML worker entry point. The actual `plantuml.jar` invocation is a
//! separate collaborator; this binary only implements the claim/render/
//! report protocol loop around it.

use clap::Parser;
use clm_common::{ExecutionMode, JobType};
use clm_protocol::{DirectClient, ProxiedClient, WorkerClient};
use clm_worker::{SimulatedRenderBackend, WorkerLoopConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
struct Args {
    #[arg(long)]
    store_db: Option<std::path::PathBuf>,

    #[arg(long, default_value = "direct")]
    execution_mode: String,

    /// Seconds a single render may run before the worker reports it failed.
    #[arg(long, default_value_t = 600)]
    max_job_time_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    clm_common::tracing_setup::init_tracing("info", clm_common::tracing_setup::TracingFormat::Pretty);
    let args = Args::parse();

    let execution_mode = if args.execution_mode == "docker" {
        ExecutionMode::Docker
    } else {
        ExecutionMode::Direct
    };

    let client: Arc<dyn WorkerClient> = match std::env::var("CLM_SIDECAR_ADDR") {
        Ok(addr) => Arc::new(ProxiedClient::new(addr)),
        Err(_) => {
            let db_path = args
                .store_db
                .unwrap_or_else(|| std::path::PathBuf::from("clm-build.db"));
            let config = clm_common::config::StoreConfig {
                db_path,
                ..Default::default()
            };
            let store = Arc::new(clm_store::Store::open(config).await?);
            Arc::new(DirectClient::new(store))
        }
    };

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        signal_token.cancel();
    });

    clm_worker::run(
        client,
        Arc::new(SimulatedRenderBackend),
        WorkerLoopConfig {
            job_type: JobType::Plantuml,
            execution_mode,
            executor_id: std::process::id().to_string(),
            poll_wait: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(10),
            max_job_time: Duration::from_secs(args.max_job_time_secs),
        },
        shutdown,
    )
    .await?;

    Ok(())
}
