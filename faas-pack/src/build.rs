use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info};

use crate::error::PackError;

const PIP_INSTALL_TIMEOUT: Duration = Duration::from_secs(300);
const SPIN_BUILD_TIMEOUT: Duration = Duration::from_secs(600);

/// Local build path: prepares the tool environment, installs dependencies,
/// and invokes the compile tool to produce a Wasm artifact.
#[derive(Clone, Debug)]
pub struct BuildExecutor {
    venv_template: PathBuf,
}

impl BuildExecutor {
    pub fn new(venv_template: impl Into<PathBuf>) -> Self {
        Self {
            venv_template: venv_template.into(),
        }
    }

    /// Copy the pre-baked tool tree into `<app-dir>/.venv`, replacing any
    /// previous copy. Symlinks are preserved: the tree relies on them for
    /// its interpreter.
    pub fn prepare_environment(&self, app_dir: &Path) -> Result<(), PackError> {
        if !self.venv_template.exists() {
            return Err(PackError::VenvTemplateMissing(self.venv_template.clone()));
        }

        let target = app_dir.join(".venv");
        if target.exists() {
            std::fs::remove_dir_all(&target)?;
        }
        copy_tree(&self.venv_template, &target)?;

        if !target.join("bin").exists() {
            return Err(PackError::VenvTemplateInvalid);
        }
        Ok(())
    }

    /// Install dependencies when the tree carries a manifest at its root.
    pub async fn install_requirements(&self, app_dir: &Path) -> Result<(), PackError> {
        let requirements = app_dir.join("requirements.txt");
        if !requirements.exists() {
            return Ok(());
        }

        let pip = app_dir.join(".venv").join("bin").join("pip");
        if !pip.exists() {
            return Err(PackError::ToolMissing { tool: "pip" });
        }

        let result = tokio::time::timeout(
            PIP_INSTALL_TIMEOUT,
            Command::new(&pip)
                .arg("install")
                .arg("-r")
                .arg(&requirements)
                .current_dir(app_dir)
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .output(),
        )
        .await;

        match result {
            Ok(Ok(output)) if output.status.success() => Ok(()),
            Ok(Ok(output)) => Err(PackError::PipInstallFailed(
                String::from_utf8_lossy(&output.stderr).to_string(),
            )),
            Ok(Err(e)) => Err(PackError::Io(e)),
            Err(_) => Err(PackError::PipInstallTimeout),
        }
    }

    /// Run the compile tool against the prepared tree and locate the Wasm
    /// artifact it produced.
    pub async fn build(&self, app_dir: &Path) -> Result<PathBuf, PackError> {
        let venv = app_dir.join(".venv");
        let path_var = format!(
            "{}/bin:{}",
            venv.display(),
            std::env::var("PATH").unwrap_or_default()
        );

        let result = tokio::time::timeout(
            SPIN_BUILD_TIMEOUT,
            Command::new("spin")
                .arg("build")
                .current_dir(app_dir)
                .env("PATH", path_var)
                .env("VIRTUAL_ENV", &venv)
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .output(),
        )
        .await;

        let output = match result {
            Ok(Ok(output)) => output,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PackError::ToolMissing { tool: "spin" })
            }
            Ok(Err(e)) => return Err(PackError::Io(e)),
            Err(_) => return Err(PackError::BuildTimeout),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = if stderr.trim().is_empty() {
                String::from_utf8_lossy(&output.stdout).to_string()
            } else {
                stderr.to_string()
            };
            return Err(PackError::BuildFailed(detail));
        }

        find_wasm_artifact(app_dir).ok_or(PackError::ArtifactMissing)
    }

    /// The complete local pipeline: environment, dependencies, compile.
    pub async fn full_build(&self, app_dir: &Path) -> Result<PathBuf, PackError> {
        self.prepare_environment(app_dir)?;
        self.install_requirements(app_dir).await?;
        let wasm = self.build(app_dir).await?;
        info!(wasm = %wasm.display(), "local build produced artifact");
        Ok(wasm)
    }
}

/// `app.wasm` by convention, otherwise the first `*.wasm` in the tree root.
fn find_wasm_artifact(app_dir: &Path) -> Option<PathBuf> {
    let default = app_dir.join("app.wasm");
    if default.exists() {
        return Some(default);
    }
    let entries = std::fs::read_dir(app_dir).ok()?;
    let mut wasm_files: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "wasm"))
        .collect();
    wasm_files.sort();
    wasm_files.into_iter().next()
}

/// Recursive copy that keeps symlinks as symlinks.
fn copy_tree(source: &Path, dest: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dest)?;
    for entry in std::fs::read_dir(source)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let target = dest.join(entry.file_name());
        if file_type.is_symlink() {
            let link = std::fs::read_link(entry.path())?;
            debug!(from = %entry.path().display(), to = %link.display(), "copying symlink");
            #[cfg(unix)]
            std::os::unix::fs::symlink(link, &target)?;
            #[cfg(not(unix))]
            std::fs::copy(entry.path(), &target).map(|_| ())?;
        } else if file_type.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
