use std::path::PathBuf;
use std::sync::Arc;

use faas_store::ObjectStore;
use faas_types::BuildStatus;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::build::BuildExecutor;
use crate::core_client::CoreService;
use crate::error::PackError;
use crate::ingest::FileIngestor;
use crate::push::PushExecutor;
use crate::task_manager::{TaskFields, TaskManager};

/// Parameters of a push pipeline run.
#[derive(Clone, Debug)]
pub struct PushJob {
    pub registry_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub tag: Option<String>,
    pub app_dir: Option<PathBuf>,
    pub source_uri: Option<String>,
}

struct BuildStageOutcome {
    wasm_path: Option<String>,
    app_dir: PathBuf,
    source_uri: String,
}

/// Runs the build, push, and build-and-push pipelines as background tasks,
/// owning every status transition for the tasks it drives.
pub struct Orchestrator {
    objects: Arc<ObjectStore>,
    tasks: Arc<Mutex<TaskManager>>,
    core: Arc<dyn CoreService>,
    ingestor: FileIngestor,
    builder: BuildExecutor,
    pusher: PushExecutor,
}

impl Orchestrator {
    pub fn new(
        objects: Arc<ObjectStore>,
        tasks: Arc<Mutex<TaskManager>>,
        core: Arc<dyn CoreService>,
        builder: BuildExecutor,
    ) -> Self {
        Self {
            objects,
            tasks,
            core,
            ingestor: FileIngestor::new(),
            builder,
            pusher: PushExecutor::new(),
        }
    }

    async fn set_status(&self, task_id: &str, status: BuildStatus, fields: TaskFields) {
        self.tasks
            .lock()
            .await
            .update_status(task_id, status, fields)
            .await;
    }

    pub fn spawn_build(
        self: &Arc<Self>,
        task_id: String,
        workspace_id: String,
        data: Vec<u8>,
        filename: String,
        app_name: Option<String>,
    ) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run_build(task_id, workspace_id, data, filename, app_name)
                .await;
        });
    }

    pub fn spawn_push(self: &Arc<Self>, task_id: String, workspace_id: String, job: PushJob) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run_push(task_id, workspace_id, job).await;
        });
    }

    #[allow(clippy::too_many_arguments)]
    pub fn spawn_build_and_push(
        self: &Arc<Self>,
        task_id: String,
        workspace_id: String,
        data: Vec<u8>,
        filename: String,
        app_name: Option<String>,
        job: PushJob,
    ) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run_build_and_push(task_id, workspace_id, data, filename, app_name, job)
                .await;
        });
    }

    async fn run_build(
        &self,
        task_id: String,
        workspace_id: String,
        data: Vec<u8>,
        filename: String,
        app_name: Option<String>,
    ) {
        self.set_status(&task_id, BuildStatus::Building, TaskFields::default())
            .await;

        match self
            .build_stage(&task_id, &workspace_id, &data, &filename, app_name.as_deref())
            .await
        {
            Ok(outcome) => {
                info!(%task_id, "build pipeline finished");
                self.set_status(
                    &task_id,
                    BuildStatus::Done,
                    TaskFields {
                        wasm_path: outcome.wasm_path,
                        app_dir: Some(outcome.app_dir.display().to_string()),
                        ..TaskFields::default()
                    },
                )
                .await;
            }
            Err(e) => {
                error!(%task_id, error = %e, "build pipeline failed");
                self.set_status(&task_id, BuildStatus::Failed, TaskFields::error(e.to_string()))
                    .await;
            }
        }
    }

    async fn run_push(&self, task_id: String, workspace_id: String, job: PushJob) {
        self.set_status(&task_id, BuildStatus::Pushing, TaskFields::default())
            .await;

        match self.push_stage(&task_id, &workspace_id, &job, None).await {
            Ok(image_url) => {
                info!(%task_id, "push pipeline finished");
                self.set_status(
                    &task_id,
                    BuildStatus::Done,
                    TaskFields {
                        image_url,
                        ..TaskFields::default()
                    },
                )
                .await;
            }
            Err(e) => {
                error!(%task_id, error = %e, "push pipeline failed");
                self.set_status(&task_id, BuildStatus::Failed, TaskFields::error(e.to_string()))
                    .await;
            }
        }
    }

    async fn run_build_and_push(
        &self,
        task_id: String,
        workspace_id: String,
        data: Vec<u8>,
        filename: String,
        app_name: Option<String>,
        job: PushJob,
    ) {
        self.set_status(&task_id, BuildStatus::Building, TaskFields::default())
            .await;

        let outcome = match self
            .build_stage(&task_id, &workspace_id, &data, &filename, app_name.as_deref())
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(%task_id, error = %e, "build stage failed");
                self.set_status(&task_id, BuildStatus::Failed, TaskFields::error(e.to_string()))
                    .await;
                return;
            }
        };

        // The artifact location is recorded at the PUSHING transition so a
        // later push failure still leaves it on the task.
        self.set_status(
            &task_id,
            BuildStatus::Pushing,
            TaskFields {
                wasm_path: outcome.wasm_path.clone(),
                app_dir: Some(outcome.app_dir.display().to_string()),
                ..TaskFields::default()
            },
        )
        .await;

        let push_job = PushJob {
            app_dir: Some(outcome.app_dir.clone()),
            source_uri: Some(outcome.source_uri.clone()),
            ..job
        };
        match self
            .push_stage(&task_id, &workspace_id, &push_job, Some(&outcome.app_dir))
            .await
        {
            Ok(image_url) => {
                info!(%task_id, "build-and-push pipeline finished");
                self.set_status(
                    &task_id,
                    BuildStatus::Done,
                    TaskFields {
                        wasm_path: outcome.wasm_path,
                        image_url,
                        ..TaskFields::default()
                    },
                )
                .await;
            }
            Err(e) => {
                error!(%task_id, error = %e, "push stage failed");
                self.set_status(&task_id, BuildStatus::Failed, TaskFields::error(e.to_string()))
                    .await;
            }
        }
    }

    /// Ingest, mirror the source tree, and produce an artifact: delegated to
    /// the compile service when one is configured, otherwise type-checked and
    /// built locally with the artifact uploaded afterwards.
    async fn build_stage(
        &self,
        task_id: &str,
        workspace_id: &str,
        data: &[u8],
        filename: &str,
        app_name: Option<&str>,
    ) -> Result<BuildStageOutcome, PackError> {
        let work_dir = self.ingestor.create_work_dir()?;
        let app_dir = self.ingestor.ingest(data, filename, &work_dir)?;

        let source_uri = self
            .objects
            .upload_source_directory(workspace_id, task_id, &app_dir)
            .await?;

        let wasm_path = if self.core.is_configured() {
            self.core
                .build(workspace_id, task_id, &source_uri, app_name)
                .await?
        } else {
            if has_python_sources(&app_dir) {
                let check = crate::typecheck::validate_python(&app_dir).await?;
                if !check.success {
                    return Err(PackError::TypeCheckFailed(check.output));
                }
            }
            let wasm_file = self.builder.full_build(&app_dir).await?;
            Some(self.objects.upload_artifact(task_id, &wasm_file).await?)
        };

        Ok(BuildStageOutcome {
            wasm_path,
            app_dir,
            source_uri,
        })
    }

    /// Push via the compile service when it is configured and a source uri
    /// is known; otherwise ensure a local source tree (downloading it if
    /// necessary) and push from there. A directory downloaded for the
    /// occasion is removed on exit.
    async fn push_stage(
        &self,
        task_id: &str,
        workspace_id: &str,
        job: &PushJob,
        local_dir_hint: Option<&PathBuf>,
    ) -> Result<Option<String>, PackError> {
        if self.core.is_configured() {
            if let Some(source_uri) = &job.source_uri {
                return self
                    .core
                    .push(
                        workspace_id,
                        task_id,
                        source_uri,
                        &job.registry_url,
                        job.tag.as_deref(),
                    )
                    .await;
            }
        }

        let existing_dir = local_dir_hint
            .cloned()
            .or_else(|| job.app_dir.clone())
            .filter(|dir| dir.exists());

        let mut _download_guard: Option<tempfile::TempDir> = None;
        let local_dir = match existing_dir {
            Some(dir) => dir,
            None => match &job.source_uri {
                Some(source_uri) => {
                    let scratch = tempfile::Builder::new().prefix("spin_push_").tempdir()?;
                    let dir = self
                        .objects
                        .download_source_directory(source_uri, scratch.path())
                        .await?;
                    _download_guard = Some(scratch);
                    dir
                }
                None => {
                    return Err(PackError::AppDirMissing(
                        job.app_dir.clone().unwrap_or_default(),
                    ))
                }
            },
        };

        let image = self
            .pusher
            .full_push(
                &local_dir,
                &job.registry_url,
                job.username.as_deref(),
                job.password.as_deref(),
                job.tag.as_deref(),
            )
            .await?;
        Ok(Some(image))
    }
}

fn has_python_sources(app_dir: &std::path::Path) -> bool {
    std::fs::read_dir(app_dir)
        .map(|entries| {
            entries
                .flatten()
                .any(|e| e.path().extension().is_some_and(|ext| ext == "py"))
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn python_source_detection_looks_at_the_root() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!has_python_sources(dir.path()));
        std::fs::write(dir.path().join("spin.toml"), "x").unwrap();
        assert!(!has_python_sources(dir.path()));
        std::fs::write(dir.path().join("app.py"), "pass").unwrap();
        assert!(has_python_sources(dir.path()));
    }
}
