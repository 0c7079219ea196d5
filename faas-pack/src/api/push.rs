use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use faas_types::TaskState;
use tracing::info;
use uuid::Uuid;

use crate::api::error::{ApiError, FieldError};
use crate::api::AppState;
use crate::orchestrator::PushJob;
use crate::types::request::PushRequest;
use crate::types::response::TaskAccepted;

pub async fn handle_push(
    State(state): State<Arc<AppState>>,
    request: Result<Json<PushRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TaskAccepted>), ApiError> {
    let Json(request) = request.map_err(|e| ApiError::invalid_body(e.body_text()))?;

    let mut errors = Vec::new();
    if request.registry_url.trim().is_empty() {
        errors.push(FieldError::required("registry_url"));
    }
    if request.workspace_id.trim().is_empty() {
        errors.push(FieldError::required("workspace_id"));
    }
    if request.app_dir.trim().is_empty() {
        errors.push(FieldError::required("app_dir"));
    }
    if !errors.is_empty() {
        return Err(ApiError::validation(errors));
    }

    let task_id = Uuid::new_v4().to_string();
    state
        .tasks
        .lock()
        .await
        .create_task(
            &task_id,
            Some(&request.workspace_id),
            None,
            request.s3_source_path.as_deref(),
        )
        .await;

    let job = PushJob {
        registry_url: request.registry_url.clone(),
        username: Some(request.username.clone()).filter(|u| !u.is_empty()),
        password: Some(request.password.clone()).filter(|p| !p.is_empty()),
        tag: request.tag.clone(),
        app_dir: Some(PathBuf::from(&request.app_dir)),
        source_uri: request.s3_source_path.clone(),
    };

    info!(%task_id, workspace_id = %request.workspace_id, "accepted push request");
    state
        .orchestrator
        .spawn_push(task_id.clone(), request.workspace_id.clone(), job);

    Ok((
        StatusCode::ACCEPTED,
        Json(TaskAccepted {
            task_id,
            status: TaskState::Pending,
            message: "Push task created".to_string(),
            source_s3_path: None,
        }),
    ))
}
