use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use crate::error::PackError;

const BUILD_ENDPOINT: &str = "/api/v1/build";
const PUSH_ENDPOINT: &str = "/api/v1/push";

/// Remote compile capability. One contract, two implementations: the HTTP
/// client against a configured endpoint, and a mock that keeps the system
/// self-contained when no endpoint exists.
#[async_trait]
pub trait CoreService: Send + Sync {
    fn is_configured(&self) -> bool;

    async fn build(
        &self,
        workspace_id: &str,
        task_id: &str,
        source_uri: &str,
        app_name: Option<&str>,
    ) -> Result<Option<String>, PackError>;

    async fn push(
        &self,
        workspace_id: &str,
        task_id: &str,
        source_uri: &str,
        registry_url: &str,
        tag: Option<&str>,
    ) -> Result<Option<String>, PackError>;
}

/// Client for the remote compile service.
pub struct HttpCoreService {
    endpoint: Option<String>,
    timeout_secs: u64,
    client: reqwest::Client,
}

impl HttpCoreService {
    pub fn new(endpoint: Option<String>, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            endpoint: endpoint.filter(|e| !e.trim().is_empty()),
            timeout_secs,
            client,
        }
    }

    async fn post(
        &self,
        operation: &'static str,
        path: &str,
        payload: Value,
        result_key: &str,
    ) -> Result<Option<String>, PackError> {
        let endpoint = self.endpoint.as_deref().ok_or(PackError::CoreService {
            operation,
            detail: "endpoint not configured".to_string(),
        })?;

        let response = self
            .client
            .post(format!("{endpoint}{path}"))
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PackError::CoreServiceTimeout {
                        operation,
                        seconds: self.timeout_secs,
                    }
                } else {
                    PackError::CoreServiceTransport(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PackError::CoreServiceTransport(e.to_string()))?;

        if status.as_u16() == 200 || status.as_u16() == 202 {
            let data: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
            return Ok(data
                .get(result_key)
                .and_then(Value::as_str)
                .map(str::to_string));
        }

        Err(PackError::CoreService {
            operation,
            detail: extract_error(status.as_u16(), &body),
        })
    }
}

#[async_trait]
impl CoreService for HttpCoreService {
    fn is_configured(&self) -> bool {
        self.endpoint.is_some()
    }

    async fn build(
        &self,
        workspace_id: &str,
        task_id: &str,
        source_uri: &str,
        app_name: Option<&str>,
    ) -> Result<Option<String>, PackError> {
        let mut payload = json!({
            "workspace_id": workspace_id,
            "task_id": task_id,
            "s3_source_path": source_uri,
        });
        if let Some(app_name) = app_name {
            payload["app_name"] = json!(app_name);
        }
        self.post("build", BUILD_ENDPOINT, payload, "wasm_path").await
    }

    async fn push(
        &self,
        workspace_id: &str,
        task_id: &str,
        source_uri: &str,
        registry_url: &str,
        tag: Option<&str>,
    ) -> Result<Option<String>, PackError> {
        let mut payload = json!({
            "workspace_id": workspace_id,
            "task_id": task_id,
            "s3_source_path": source_uri,
            "registry_url": registry_url,
        });
        if let Some(tag) = tag {
            payload["tag"] = json!(tag);
        }
        self.post("push", PUSH_ENDPOINT, payload, "image_url").await
    }
}

/// Error string from a non-success response: `detail`, `error`, or `message`
/// when the body is JSON, the raw body otherwise.
fn extract_error(status: u16, body: &str) -> String {
    if let Ok(data) = serde_json::from_str::<Value>(body) {
        for key in ["detail", "error", "message"] {
            if let Some(value) = data.get(key) {
                return match value.as_str() {
                    Some(s) => s.to_string(),
                    None => value.to_string(),
                };
            }
        }
    }
    format!("HTTP {status}: {body}")
}

/// Stand-in used when no endpoint is configured. Synthesises plausible
/// results from the task id so the rest of the pipeline behaves normally.
pub struct MockCoreService {
    bucket: String,
    artifact_prefix: String,
}

impl MockCoreService {
    pub fn new(bucket: impl Into<String>, artifact_prefix: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            artifact_prefix: artifact_prefix.into(),
        }
    }
}

#[async_trait]
impl CoreService for MockCoreService {
    fn is_configured(&self) -> bool {
        true
    }

    async fn build(
        &self,
        _workspace_id: &str,
        task_id: &str,
        _source_uri: &str,
        _app_name: Option<&str>,
    ) -> Result<Option<String>, PackError> {
        Ok(Some(format!(
            "s3://{}/{}/{}/app.wasm",
            self.bucket, self.artifact_prefix, task_id
        )))
    }

    async fn push(
        &self,
        _workspace_id: &str,
        task_id: &str,
        _source_uri: &str,
        registry_url: &str,
        tag: Option<&str>,
    ) -> Result<Option<String>, PackError> {
        let tag = match tag {
            Some(tag) => tag.to_string(),
            None => format!("mock-{}", task_id.chars().take(12).collect::<String>()),
        };
        Ok(Some(format!("{registry_url}:{tag}")))
    }
}

/// Select the HTTP client when an endpoint is configured, the mock otherwise.
pub fn core_service_from_settings(settings: &faas_config::Settings) -> Arc<dyn CoreService> {
    if settings.core_service_configured() {
        info!(
            endpoint = settings.core_service_endpoint.as_deref().unwrap_or_default(),
            "using remote core service"
        );
        Arc::new(HttpCoreService::new(
            settings.core_service_endpoint.clone(),
            settings.core_service_timeout_secs,
        ))
    } else {
        info!("no core service endpoint configured, using mock client");
        Arc::new(MockCoreService::new(
            settings.s3_bucket.clone(),
            settings.artifact_prefix.clone(),
        ))
    }
}
