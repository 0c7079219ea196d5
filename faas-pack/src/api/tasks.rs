use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::api::AppState;
use crate::types::response::{TaskStatusResponse, WorkspaceTasksResponse};

#[derive(Debug, Deserialize)]
pub struct TaskQuery {
    #[serde(default)]
    pub workspace_id: Option<String>,
}

pub async fn get_task_status(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
    Query(query): Query<TaskQuery>,
) -> Result<Json<TaskStatusResponse>, ApiError> {
    let task = state
        .tasks
        .lock()
        .await
        .get_task(&task_id, query.workspace_id.as_deref())
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Task not found: {task_id}")))?;

    Ok(Json(TaskStatusResponse::from(task)))
}

pub async fn list_workspace_tasks(
    State(state): State<Arc<AppState>>,
    Path(workspace_id): Path<String>,
) -> Json<WorkspaceTasksResponse> {
    let tasks = state.tasks.lock().await.list_tasks(&workspace_id).await;
    let entries: Vec<_> = tasks.into_iter().map(Into::into).collect();
    Json(WorkspaceTasksResponse {
        workspace_id,
        count: entries.len(),
        tasks: entries,
    })
}
