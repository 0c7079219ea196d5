use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::error::PackError;

const PUSH_TIMEOUT: Duration = Duration::from_secs(300);
const LOGIN_TIMEOUT: Duration = Duration::from_secs(60);

/// Pushes a built application to an OCI registry via the spin CLI.
#[derive(Clone, Debug, Default)]
pub struct PushExecutor;

impl PushExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Deterministic 12-char tag: SHA-256 over the concatenation of all file
    /// contents in the tree, sorted by relative path.
    pub fn generate_tag(&self, app_dir: &Path) -> Result<String, PackError> {
        let mut files: Vec<PathBuf> = WalkDir::new(app_dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.path().to_path_buf())
            .collect();
        files.sort_by_key(|p| {
            p.strip_prefix(app_dir)
                .map(|r| r.to_path_buf())
                .unwrap_or_else(|_| p.clone())
        });

        let mut hasher = Sha256::new();
        for file in files {
            hasher.update(std::fs::read(&file)?);
        }
        let digest = hex::encode(hasher.finalize());
        Ok(digest[..12].to_string())
    }

    /// Log into the registry before pushing. Explicit credentials win; for
    /// ECR-style registries without credentials the password comes from the
    /// ambient cloud identity; anything else skips login and lets the push
    /// surface the tool's own error.
    pub async fn login(
        &self,
        registry_url: &str,
        username: Option<&str>,
        password: Option<&str>,
    ) -> Result<(), PackError> {
        let host = registry_host(registry_url);
        match (username, password) {
            (Some(username), Some(password)) => {
                self.spin_login(host, username, password).await
            }
            _ if is_ecr_registry(host) => {
                let password = self.ecr_login_password().await?;
                self.spin_login(host, "AWS", &password).await
            }
            _ => {
                warn!(host, "no registry credentials supplied, skipping login");
                Ok(())
            }
        }
    }

    async fn spin_login(&self, host: &str, username: &str, password: &str) -> Result<(), PackError> {
        let mut child = Command::new("spin")
            .args(["registry", "login", "--username", username, "--password-stdin", host])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    PackError::ToolMissing { tool: "spin" }
                } else {
                    PackError::Io(e)
                }
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(password.as_bytes()).await?;
            drop(stdin);
        }

        let output = tokio::time::timeout(LOGIN_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| PackError::LoginFailed("registry login timed out".to_string()))??;

        if !output.status.success() {
            return Err(PackError::LoginFailed(
                String::from_utf8_lossy(&output.stderr).to_string(),
            ));
        }
        Ok(())
    }

    /// Workload-identity password for ECR registries.
    async fn ecr_login_password(&self) -> Result<String, PackError> {
        let output = tokio::time::timeout(
            LOGIN_TIMEOUT,
            Command::new("aws")
                .args(["ecr", "get-login-password"])
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .output(),
        )
        .await
        .map_err(|_| PackError::LoginFailed("aws ecr get-login-password timed out".to_string()))?
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PackError::ToolMissing { tool: "aws" }
            } else {
                PackError::Io(e)
            }
        })?;

        if !output.status.success() {
            return Err(PackError::LoginFailed(
                String::from_utf8_lossy(&output.stderr).to_string(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    pub async fn push(&self, app_dir: &Path, image_ref: &str) -> Result<(), PackError> {
        let result = tokio::time::timeout(
            PUSH_TIMEOUT,
            Command::new("spin")
                .args(["registry", "push", image_ref])
                .current_dir(app_dir)
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .output(),
        )
        .await;

        match result {
            Ok(Ok(output)) if output.status.success() => Ok(()),
            Ok(Ok(output)) => Err(PackError::PushFailed(
                String::from_utf8_lossy(&output.stderr).to_string(),
            )),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(PackError::ToolMissing { tool: "spin" })
            }
            Ok(Err(e)) => Err(PackError::Io(e)),
            Err(_) => Err(PackError::PushTimeout),
        }
    }

    /// Login and push, returning the pushed image reference.
    pub async fn full_push(
        &self,
        app_dir: &Path,
        registry_url: &str,
        username: Option<&str>,
        password: Option<&str>,
        tag: Option<&str>,
    ) -> Result<String, PackError> {
        if !app_dir.exists() {
            return Err(PackError::AppDirMissing(app_dir.to_path_buf()));
        }

        let tag = match tag {
            Some(tag) => tag.to_string(),
            None => self.generate_tag(app_dir)?,
        };
        let image_ref = format!("{registry_url}:{tag}");

        self.login(registry_url, username, password).await?;
        self.push(app_dir, &image_ref).await?;
        info!(%image_ref, "pushed image");
        Ok(image_ref)
    }
}

fn registry_host(registry_url: &str) -> &str {
    registry_url.split('/').next().unwrap_or(registry_url)
}

/// Registries of the cloud-provider type that support workload identity.
fn is_ecr_registry(host: &str) -> bool {
    host.contains(".dkr.ecr.") && host.ends_with(".amazonaws.com")
}
