use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use faas_config::Settings;
use faas_deploy::Deployer;
use faas_store::ObjectStore;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::orchestrator::Orchestrator;
use crate::task_manager::TaskManager;

pub mod build;
pub mod deploy;
pub mod error;
pub mod health;
pub mod logging;
pub mod push;
pub mod scaffold;
pub mod tasks;

pub use error::{ApiError, FieldError};

/// Everything the handlers need, constructed once per process.
pub struct AppState {
    pub settings: Settings,
    pub objects: Arc<ObjectStore>,
    pub tasks: Arc<Mutex<TaskManager>>,
    pub orchestrator: Arc<Orchestrator>,
    pub deployer: Deployer,
}

pub async fn serve(addr: String, state: Arc<AppState>) -> Result<(), std::io::Error> {
    let routes = build_routes(state);

    info!(%addr, "binding API listener");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(%addr, "serving faas-builder API");
    axum::serve(listener, routes).await
}

fn build_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/build", post(build::handle_build))
        .route("/push", post(push::handle_push))
        .route("/build-and-push", post(build::handle_build_and_push))
        .route("/scaffold", post(scaffold::handle_scaffold))
        .route("/deploy", post(deploy::handle_deploy))
        .route("/tasks/:task_id", get(tasks::get_task_status))
        .route("/workspaces/:workspace_id/tasks", get(tasks::list_workspace_tasks))
        .route("/health", get(health::health_check))
        .layer(middleware::from_fn(logging::log_requests))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
