use axum::extract::rejection::JsonRejection;
use axum::Json;
use faas_deploy::ScaffoldOutcome;

use crate::api::error::ApiError;
use crate::types::request::ScaffoldRequest;

pub async fn handle_scaffold(
    request: Result<Json<ScaffoldRequest>, JsonRejection>,
) -> Result<Json<ScaffoldOutcome>, ApiError> {
    let Json(request) = request.map_err(|e| ApiError::invalid_body(e.body_text()))?;

    let outcome = faas_deploy::scaffold(
        &request.image_ref,
        request.component.as_deref(),
        request.replicas,
        request.output_path.as_deref(),
    )
    .await;

    Ok(Json(outcome))
}
