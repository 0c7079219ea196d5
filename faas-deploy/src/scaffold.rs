use std::process::Stdio;

use serde::{Deserialize, Serialize};
use tokio::process::Command;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScaffoldOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yaml_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Assemble the `spin kube scaffold` invocation for the given parameters.
pub fn build_command(
    image_ref: &str,
    component: Option<&str>,
    replicas: u32,
    output_path: Option<&str>,
) -> Vec<String> {
    let mut cmd = vec![
        "spin".to_string(),
        "kube".to_string(),
        "scaffold".to_string(),
        "--from".to_string(),
        image_ref.to_string(),
    ];
    if let Some(component) = component {
        cmd.push("--component".to_string());
        cmd.push(component.to_string());
    }
    cmd.push("--replicas".to_string());
    cmd.push(replicas.to_string());
    if let Some(output_path) = output_path {
        cmd.push("--out".to_string());
        cmd.push(output_path.to_string());
    }
    cmd
}

/// Generate a SpinApp manifest with `spin kube scaffold`. On success the
/// YAML lands on stdout unless an output path redirected it to a file.
pub async fn scaffold(
    image_ref: &str,
    component: Option<&str>,
    replicas: u32,
    output_path: Option<&str>,
) -> ScaffoldOutcome {
    let cmd = build_command(image_ref, component, replicas, output_path);

    let output = Command::new(&cmd[0])
        .args(&cmd[1..])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await;

    match output {
        Ok(output) if output.status.success() => ScaffoldOutcome {
            success: true,
            yaml_content: if output_path.is_none() {
                Some(String::from_utf8_lossy(&output.stdout).to_string())
            } else {
                None
            },
            file_path: output_path.map(str::to_string),
            error: None,
        },
        Ok(output) => {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
            let error = if !stderr.is_empty() {
                stderr
            } else if !stdout.is_empty() {
                stdout
            } else {
                "Unknown error occurred".to_string()
            };
            ScaffoldOutcome {
                success: false,
                yaml_content: None,
                file_path: None,
                error: Some(error),
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => ScaffoldOutcome {
            success: false,
            yaml_content: None,
            file_path: None,
            error: Some("spin CLI not found".to_string()),
        },
        Err(e) => ScaffoldOutcome {
            success: false,
            yaml_content: None,
            file_path: None,
            error: Some(e.to_string()),
        },
    }
}
