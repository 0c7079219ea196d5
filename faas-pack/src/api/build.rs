use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use faas_types::TaskState;
use tracing::info;
use uuid::Uuid;

use crate::api::error::{ApiError, FieldError};
use crate::api::AppState;
use crate::orchestrator::PushJob;
use crate::types::response::TaskAccepted;

/// Decoded multipart upload: the file plus any text fields.
struct UploadForm {
    file: Option<(Vec<u8>, String)>,
    fields: HashMap<String, String>,
}

async fn read_upload(multipart: &mut Multipart) -> Result<UploadForm, ApiError> {
    let mut form = UploadForm {
        file: None,
        fields: HashMap::new(),
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::invalid_body(e.to_string()))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        if name == "file" {
            let filename = field
                .file_name()
                .map(str::to_string)
                .unwrap_or_else(|| "app.py".to_string());
            let data = field
                .bytes()
                .await
                .map_err(|e| ApiError::invalid_body(e.to_string()))?;
            form.file = Some((data.to_vec(), filename));
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| ApiError::invalid_body(e.to_string()))?;
            form.fields.insert(name, value);
        }
    }

    Ok(form)
}

fn non_empty(form: &UploadForm, name: &str) -> Option<String> {
    form.fields
        .get(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub async fn handle_build(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<TaskAccepted>), ApiError> {
    let form = read_upload(&mut multipart).await?;

    let mut errors = Vec::new();
    if form.file.is_none() {
        errors.push(FieldError::required("file"));
    }
    let workspace_id = non_empty(&form, "workspace_id");
    if workspace_id.is_none() {
        errors.push(FieldError::required("workspace_id"));
    }
    if !errors.is_empty() {
        return Err(ApiError::validation(errors));
    }

    let (data, filename) = form.file.clone().unwrap_or_default();
    let workspace_id = workspace_id.unwrap_or_default();
    let app_name = non_empty(&form, "app_name");

    let task_id = Uuid::new_v4().to_string();
    let source_prefix = state
        .objects
        .layout()
        .source_prefix_uri(&workspace_id, &task_id);

    state
        .tasks
        .lock()
        .await
        .create_task(
            &task_id,
            Some(&workspace_id),
            app_name.as_deref(),
            Some(&source_prefix),
        )
        .await;

    info!(%task_id, %workspace_id, %filename, "accepted build request");
    state.orchestrator.spawn_build(
        task_id.clone(),
        workspace_id,
        data,
        filename,
        app_name,
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(TaskAccepted {
            task_id,
            status: TaskState::Pending,
            message: "Build task created".to_string(),
            source_s3_path: Some(source_prefix),
        }),
    ))
}

pub async fn handle_build_and_push(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<TaskAccepted>), ApiError> {
    let form = read_upload(&mut multipart).await?;

    let mut errors = Vec::new();
    if form.file.is_none() {
        errors.push(FieldError::required("file"));
    }
    let workspace_id = non_empty(&form, "workspace_id");
    if workspace_id.is_none() {
        errors.push(FieldError::required("workspace_id"));
    }
    // Registry comes from the request or from process configuration.
    let registry_url = non_empty(&form, "registry_url").or_else(|| {
        state
            .settings
            .registry_url
            .clone()
            .filter(|r| !r.trim().is_empty())
    });
    if registry_url.is_none() {
        errors.push(FieldError::new(
            "registry_url",
            "field required and no default registry is configured",
        ));
    }
    if !errors.is_empty() {
        return Err(ApiError::validation(errors));
    }

    let (data, filename) = form.file.clone().unwrap_or_default();
    let workspace_id = workspace_id.unwrap_or_default();
    let registry_url = registry_url.unwrap_or_default();
    let app_name = non_empty(&form, "app_name");

    let task_id = Uuid::new_v4().to_string();
    let source_prefix = state
        .objects
        .layout()
        .source_prefix_uri(&workspace_id, &task_id);

    state
        .tasks
        .lock()
        .await
        .create_task(
            &task_id,
            Some(&workspace_id),
            app_name.as_deref(),
            Some(&source_prefix),
        )
        .await;

    let job = PushJob {
        registry_url,
        // Absent credentials mean ambient-identity login on the local path.
        username: non_empty(&form, "username"),
        password: non_empty(&form, "password"),
        tag: non_empty(&form, "tag"),
        app_dir: None,
        source_uri: Some(source_prefix.clone()),
    };

    info!(%task_id, %workspace_id, %filename, "accepted build-and-push request");
    state.orchestrator.spawn_build_and_push(
        task_id.clone(),
        workspace_id,
        data,
        filename,
        app_name,
        job,
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(TaskAccepted {
            task_id,
            status: TaskState::Pending,
            message: "Build and push task created".to_string(),
            source_s3_path: Some(source_prefix),
        }),
    ))
}
