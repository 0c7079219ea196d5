use std::io::Write;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{info, warn};

const NAMESPACE_CHECK_TIMEOUT: Duration = Duration::from_secs(30);
const APPLY_TIMEOUT: Duration = Duration::from_secs(60);
const SERVICE_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Observed state of the service the controller creates next to a SpinApp.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Found,
    Pending,
    NotFound,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceQuery {
    pub status: ServiceStatus,
    pub endpoint: Option<String>,
}

#[derive(Clone, Debug)]
pub struct DeployOutcome {
    pub success: bool,
    pub app_name: Option<String>,
    pub namespace: Option<String>,
    pub service_name: Option<String>,
    pub service_status: ServiceStatus,
    pub endpoint: Option<String>,
    pub enable_autoscaling: bool,
    pub use_spot: bool,
    pub error: Option<String>,
}

/// Applies SpinApp manifests through the cluster CLI and polls for the
/// auto-created service endpoint.
#[derive(Clone, Debug, Default)]
pub struct Deployer;

impl Deployer {
    pub fn new() -> Self {
        Self
    }

    /// True when the target namespace exists. Any CLI failure (missing
    /// binary, timeout, non-zero exit) reads as "absent".
    pub async fn check_namespace(&self, namespace: &str) -> bool {
        let result = tokio::time::timeout(
            NAMESPACE_CHECK_TIMEOUT,
            Command::new("kubectl")
                .args(["get", "namespace", namespace])
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .output(),
        )
        .await;
        matches!(result, Ok(Ok(output)) if output.status.success())
    }

    pub async fn apply_manifest(&self, manifest_path: &Path) -> Result<(), String> {
        let result = tokio::time::timeout(
            APPLY_TIMEOUT,
            Command::new("kubectl")
                .arg("apply")
                .arg("-f")
                .arg(manifest_path)
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .output(),
        )
        .await;

        match result {
            Ok(Ok(output)) if output.status.success() => Ok(()),
            Ok(Ok(output)) => {
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                if stderr.is_empty() {
                    Err("Failed to apply manifest".to_string())
                } else {
                    Err(stderr)
                }
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Err("kubectl not found".to_string())
            }
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err("kubectl apply timed out".to_string()),
        }
    }

    /// Deploy a rendered manifest: namespace check, apply from a temporary
    /// file, then query the auto-created service. The temporary file is
    /// always removed.
    pub async fn deploy(
        &self,
        manifest_yaml: &str,
        namespace: &str,
        app_name: &str,
        enable_autoscaling: bool,
        use_spot: bool,
    ) -> DeployOutcome {
        if !self.check_namespace(namespace).await {
            return DeployOutcome {
                success: false,
                app_name: Some(app_name.to_string()),
                namespace: Some(namespace.to_string()),
                service_name: None,
                service_status: ServiceStatus::NotFound,
                endpoint: None,
                enable_autoscaling,
                use_spot,
                error: Some(format!("Namespace '{namespace}' not found")),
            };
        }

        let manifest_file = match write_manifest_tempfile(manifest_yaml) {
            Ok(file) => file,
            Err(e) => {
                return DeployOutcome {
                    success: false,
                    app_name: Some(app_name.to_string()),
                    namespace: Some(namespace.to_string()),
                    service_name: None,
                    service_status: ServiceStatus::NotFound,
                    endpoint: None,
                    enable_autoscaling,
                    use_spot,
                    error: Some(format!("failed to write manifest file: {e}")),
                }
            }
        };

        if let Err(error) = self.apply_manifest(manifest_file.path()).await {
            warn!(%namespace, app_name, %error, "manifest apply failed");
            return DeployOutcome {
                success: false,
                app_name: Some(app_name.to_string()),
                namespace: Some(namespace.to_string()),
                service_name: None,
                service_status: ServiceStatus::NotFound,
                endpoint: None,
                enable_autoscaling,
                use_spot,
                error: Some(error),
            };
        }

        info!(%namespace, app_name, "applied SpinApp manifest");
        let service = self.get_service(app_name, namespace).await;

        DeployOutcome {
            success: true,
            app_name: Some(app_name.to_string()),
            namespace: Some(namespace.to_string()),
            // The controller creates a service named after the app.
            service_name: Some(app_name.to_string()),
            service_status: service.status,
            endpoint: service.endpoint,
            enable_autoscaling,
            use_spot,
            error: None,
        }
    }

    /// Query the cluster IP of the app's service and classify the result.
    pub async fn get_service(&self, app_name: &str, namespace: &str) -> ServiceQuery {
        let result = tokio::time::timeout(
            SERVICE_QUERY_TIMEOUT,
            Command::new("kubectl")
                .args([
                    "get",
                    "service",
                    app_name,
                    "-n",
                    namespace,
                    "-o",
                    "jsonpath={.spec.clusterIP}",
                ])
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .output(),
        )
        .await;

        match result {
            Ok(Ok(output)) => interpret_service_query(
                output.status.success(),
                &String::from_utf8_lossy(&output.stdout),
                &String::from_utf8_lossy(&output.stderr),
                app_name,
                namespace,
            ),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => ServiceQuery {
                status: ServiceStatus::NotFound,
                endpoint: None,
            },
            Ok(Err(_)) => ServiceQuery {
                status: ServiceStatus::NotFound,
                endpoint: None,
            },
            // Slow control planes read as pending rather than absent.
            Err(_) => ServiceQuery {
                status: ServiceStatus::Pending,
                endpoint: None,
            },
        }
    }
}

fn write_manifest_tempfile(yaml: &str) -> std::io::Result<tempfile::NamedTempFile> {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile()?;
    file.write_all(yaml.as_bytes())?;
    file.flush()?;
    Ok(file)
}

fn interpret_service_query(
    status_ok: bool,
    stdout: &str,
    stderr: &str,
    app_name: &str,
    namespace: &str,
) -> ServiceQuery {
    if status_ok {
        let cluster_ip = stdout.trim();
        if !cluster_ip.is_empty() && cluster_ip != "None" {
            return ServiceQuery {
                status: ServiceStatus::Found,
                endpoint: Some(format!("{app_name}.{namespace}.svc.cluster.local")),
            };
        }
        return ServiceQuery {
            status: ServiceStatus::Pending,
            endpoint: None,
        };
    }

    if stderr.contains("NotFound") || stderr.to_lowercase().contains("not found") {
        return ServiceQuery {
            status: ServiceStatus::NotFound,
            endpoint: None,
        };
    }
    ServiceQuery {
        status: ServiceStatus::Pending,
        endpoint: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cluster_ip_means_found_with_endpoint() {
        let query = interpret_service_query(true, "10.0.12.4\n", "", "my-app", "default");
        assert_eq!(query.status, ServiceStatus::Found);
        assert_eq!(
            query.endpoint.as_deref(),
            Some("my-app.default.svc.cluster.local")
        );
    }

    #[test]
    fn empty_or_none_ip_means_pending() {
        for stdout in ["", "  ", "None"] {
            let query = interpret_service_query(true, stdout, "", "a", "ns");
            assert_eq!(query.status, ServiceStatus::Pending);
            assert!(query.endpoint.is_none());
        }
    }

    #[test]
    fn explicit_not_found_is_classified() {
        let query = interpret_service_query(
            false,
            "",
            "Error from server (NotFound): services \"a\" not found",
            "a",
            "ns",
        );
        assert_eq!(query.status, ServiceStatus::NotFound);
    }

    #[test]
    fn other_failures_read_as_pending() {
        let query = interpret_service_query(false, "", "connection refused", "a", "ns");
        assert_eq!(query.status, ServiceStatus::Pending);
    }

    #[test]
    fn service_status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ServiceStatus::NotFound).unwrap(),
            "\"not_found\""
        );
    }
}
