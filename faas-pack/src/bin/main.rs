use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use faas_config::Settings;
use faas_deploy::Deployer;
use faas_pack::api::{self, AppState};
use faas_pack::build::BuildExecutor;
use faas_pack::core_client;
use faas_pack::orchestrator::Orchestrator;
use faas_pack::task_manager::TaskManager;
use faas_store::{ObjectStore, TaskStore};
use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "faas-builder", about = "Build, push, and deploy Wasm functions")]
pub struct Cli {
    /// Override the listen host from the environment.
    #[clap(long)]
    host: Option<String>,
    /// Override the listen port from the environment.
    #[clap(long, short)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load().context("failed to load settings from environment")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(settings.log_level.clone())),
        )
        .init();

    let host = cli.host.clone().unwrap_or_else(|| settings.api_host.clone());
    let port = cli.port.unwrap_or(settings.api_port);
    let addr = format!("{host}:{port}");

    let objects = Arc::new(ObjectStore::connect(&settings).await);
    let task_store = Arc::new(TaskStore::connect(&settings).await);
    let tasks = Arc::new(Mutex::new(TaskManager::new(Some(task_store))));
    let core = core_client::core_service_from_settings(&settings);
    let builder = BuildExecutor::new(settings.venv_template_path.clone());

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&objects),
        Arc::clone(&tasks),
        core,
        builder,
    ));

    let state = Arc::new(AppState {
        settings,
        objects,
        tasks,
        orchestrator,
        deployer: Deployer::new(),
    });

    tokio::select! {
        result = api::serve(addr, state) => {
            result.context("API server exited with an error")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal, shutting down");
        }
    }

    info!("faas-builder gracefully shut down");
    Ok(())
}
