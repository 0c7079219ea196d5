use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use faas_manifest::{
    validate_autoscaling_config, ResourceLimits, SpinAppManifest, Toleration,
};
use tracing::info;

use crate::api::error::{ApiError, FieldError};
use crate::api::AppState;
use crate::types::request::DeployRequest;
use crate::types::response::DeployResponse;

pub async fn handle_deploy(
    State(state): State<Arc<AppState>>,
    request: Result<Json<DeployRequest>, JsonRejection>,
) -> Result<Json<DeployResponse>, ApiError> {
    let Json(request) = request.map_err(|e| ApiError::invalid_body(e.body_text()))?;

    if request.namespace.trim().is_empty() {
        return Err(ApiError::validation(vec![FieldError::required("namespace")]));
    }
    if request.image_ref.trim().is_empty() {
        return Err(ApiError::validation(vec![FieldError::required("image_ref")]));
    }

    validate_autoscaling_config(request.enable_autoscaling, request.replicas)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let resources = ResourceLimits::new(
        request.cpu_limit.clone(),
        request.memory_limit.clone(),
        request.cpu_request.clone(),
        request.memory_request.clone(),
    )
    .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let app_name = request
        .app_name
        .clone()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(faas_deploy::generate_app_name);

    let tolerations: Vec<Toleration> = request
        .custom_tolerations
        .clone()
        .unwrap_or_default()
        .into_iter()
        .map(Into::into)
        .collect();

    let manifest = SpinAppManifest::builder(&app_name, &request.image_ref)
        .namespace(&request.namespace)
        .service_account(request.service_account.clone())
        .resources(resources)
        .replicas(request.replicas)
        .enable_autoscaling(request.enable_autoscaling)
        .use_spot(request.use_spot)
        .tolerations(tolerations)
        .node_affinity(request.custom_affinity.clone())
        .build()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let yaml = faas_manifest::to_yaml(&manifest).map_err(|e| ApiError::Internal(e.to_string()))?;

    info!(%app_name, namespace = %request.namespace, "deploying SpinApp");
    let outcome = state
        .deployer
        .deploy(
            &yaml,
            &request.namespace,
            &app_name,
            request.enable_autoscaling,
            request.use_spot,
        )
        .await;

    if !outcome.success {
        let error = outcome.error.unwrap_or_else(|| "Deployment failed".to_string());
        if error.to_lowercase().contains("not found") {
            return Err(ApiError::BadRequest(error));
        }
        return Err(ApiError::Internal(error));
    }

    Ok(Json(DeployResponse {
        app_name: outcome.app_name.unwrap_or(app_name),
        namespace: outcome.namespace.unwrap_or(request.namespace),
        service_name: outcome.service_name,
        service_status: outcome.service_status,
        endpoint: outcome.endpoint,
        enable_autoscaling: outcome.enable_autoscaling,
        use_spot: outcome.use_spot,
        error: None,
    }))
}
