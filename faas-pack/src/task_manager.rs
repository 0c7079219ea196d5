use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use faas_store::{TaskStore, TaskUpdate};
use faas_types::{BuildStatus, Task, TaskRecord, TaskResult, TaskState};
use tracing::warn;

/// Fields attached to a status transition. Only populated fields are
/// written; earlier values survive later transitions.
#[derive(Clone, Debug, Default)]
pub struct TaskFields {
    pub wasm_path: Option<String>,
    pub image_url: Option<String>,
    pub app_dir: Option<String>,
    pub error: Option<String>,
}

impl TaskFields {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }
}

/// Per-process task cache in front of the durable store.
///
/// Writes go through to the store whenever a workspace is associated with
/// the task; tasks created without one stay purely in memory. Reads prefer
/// the cache and backfill it from the store on a miss.
pub struct TaskManager {
    tasks: HashMap<String, Task>,
    workspaces: HashMap<String, String>,
    store: Option<Arc<TaskStore>>,
}

impl TaskManager {
    pub fn new(store: Option<Arc<TaskStore>>) -> Self {
        Self {
            tasks: HashMap::new(),
            workspaces: HashMap::new(),
            store,
        }
    }

    /// Record a new PENDING task. The durable record is written before this
    /// returns, so the HTTP response never races the store.
    pub async fn create_task(
        &mut self,
        task_id: &str,
        workspace_id: Option<&str>,
        app_name: Option<&str>,
        source_code_path: Option<&str>,
    ) {
        let mut task = Task::pending(task_id);
        task.workspace_id = workspace_id.map(str::to_string);
        task.app_name = app_name.map(str::to_string);
        self.tasks.insert(task_id.to_string(), task);

        if let Some(workspace_id) = workspace_id {
            self.workspaces
                .insert(task_id.to_string(), workspace_id.to_string());
            if let Some(store) = &self.store {
                let record = TaskRecord::new(
                    workspace_id,
                    task_id,
                    app_name.unwrap_or("unknown"),
                    source_code_path.unwrap_or(""),
                );
                if let Err(e) = store.create(&record).await {
                    warn!(task_id, error = %e, "failed to persist new task");
                }
            }
        }
    }

    /// Apply a status transition, in memory and through to the store.
    pub async fn update_status(
        &mut self,
        task_id: &str,
        status: BuildStatus,
        fields: TaskFields,
    ) -> bool {
        if let Some(task) = self.tasks.get_mut(task_id) {
            task.status = TaskState::from(status);
            task.updated_at = Utc::now();
            if fields.error.is_some() {
                task.error = fields.error.clone();
            }
            if fields.wasm_path.is_some() || fields.image_url.is_some() || fields.app_dir.is_some()
            {
                let result = task.result.get_or_insert_with(TaskResult::default);
                if let Some(wasm_path) = &fields.wasm_path {
                    result.wasm_path = Some(wasm_path.clone());
                }
                if let Some(image_url) = &fields.image_url {
                    result.image_uri = Some(image_url.clone());
                }
                if let Some(app_dir) = &fields.app_dir {
                    result.app_dir = Some(app_dir.clone());
                }
            }
        }

        let workspace_id = self.workspaces.get(task_id).cloned();
        if let (Some(workspace_id), Some(store)) = (&workspace_id, &self.store) {
            let update = TaskUpdate {
                wasm_path: fields.wasm_path,
                image_url: fields.image_url,
                error_message: fields.error,
            };
            if let Err(e) = store
                .update_status(workspace_id, task_id, status, update)
                .await
            {
                warn!(task_id, error = %e, "failed to persist status update");
            }
        }

        self.tasks.contains_key(task_id) || workspace_id.is_some()
    }

    /// Cache-first read; a miss with a known workspace falls through to the
    /// store and backfills the cache.
    pub async fn get_task(&mut self, task_id: &str, workspace_id: Option<&str>) -> Option<Task> {
        if let Some(task) = self.tasks.get(task_id) {
            return Some(task.clone());
        }

        let workspace_id = workspace_id
            .map(str::to_string)
            .or_else(|| self.workspaces.get(task_id).cloned())?;
        let store = self.store.as_ref()?;

        match store.get(&workspace_id, task_id).await {
            Ok(Some(record)) => {
                let task = task_from_record(record);
                self.tasks.insert(task_id.to_string(), task.clone());
                self.workspaces.insert(task_id.to_string(), workspace_id);
                Some(task)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(task_id, error = %e, "task store read failed");
                None
            }
        }
    }

    /// All tasks under a workspace, straight from the store, with the cache
    /// backfilled. Without a store, falls back to the cached view.
    pub async fn list_tasks(&mut self, workspace_id: &str) -> Vec<Task> {
        let Some(store) = self.store.as_ref() else {
            return self
                .tasks
                .values()
                .filter(|t| t.workspace_id.as_deref() == Some(workspace_id))
                .cloned()
                .collect();
        };

        match store.list_by_workspace(workspace_id).await {
            Ok(records) => {
                let tasks: Vec<Task> = records.into_iter().map(task_from_record).collect();
                for task in &tasks {
                    self.tasks.insert(task.task_id.clone(), task.clone());
                    self.workspaces
                        .insert(task.task_id.clone(), workspace_id.to_string());
                }
                tasks
            }
            Err(e) => {
                warn!(workspace_id, error = %e, "workspace listing failed");
                Vec::new()
            }
        }
    }
}

fn task_from_record(record: TaskRecord) -> Task {
    let result = if record.wasm_path.is_some() || record.image_url.is_some() {
        Some(TaskResult {
            wasm_path: record.wasm_path,
            image_uri: record.image_url,
            app_dir: None,
        })
    } else {
        None
    };
    Task {
        task_id: record.task_id,
        status: TaskState::from(record.status),
        created_at: record.created_at,
        updated_at: record.updated_at,
        result,
        error: record.error_message,
        workspace_id: Some(record.workspace_id),
        app_name: Some(record.app_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lifecycle_without_store_is_memory_only() {
        let mut manager = TaskManager::new(None);
        manager.create_task("t-1", None, None, None).await;

        let task = manager.get_task("t-1", None).await.unwrap();
        assert_eq!(task.status, TaskState::Pending);

        manager
            .update_status("t-1", BuildStatus::Building, TaskFields::default())
            .await;
        let task = manager.get_task("t-1", None).await.unwrap();
        assert_eq!(task.status, TaskState::Running);
        assert!(task.updated_at >= task.created_at);
    }

    #[tokio::test]
    async fn result_fields_accumulate_across_transitions() {
        let mut manager = TaskManager::new(None);
        manager.create_task("t-1", None, None, None).await;

        manager
            .update_status(
                "t-1",
                BuildStatus::Pushing,
                TaskFields {
                    wasm_path: Some("s3://b/build-artifacts/t-1/app.wasm".to_string()),
                    ..TaskFields::default()
                },
            )
            .await;
        manager
            .update_status(
                "t-1",
                BuildStatus::Failed,
                TaskFields::error("Push failed: denied"),
            )
            .await;

        let task = manager.get_task("t-1", None).await.unwrap();
        assert_eq!(task.status, TaskState::Failed);
        // The earlier wasm path survives the failing push.
        assert_eq!(
            task.result.unwrap().wasm_path.as_deref(),
            Some("s3://b/build-artifacts/t-1/app.wasm")
        );
        assert_eq!(task.error.as_deref(), Some("Push failed: denied"));
    }

    #[tokio::test]
    async fn unknown_task_is_none() {
        let mut manager = TaskManager::new(None);
        assert!(manager.get_task("missing", None).await.is_none());
        assert!(!manager
            .update_status("missing", BuildStatus::Done, TaskFields::default())
            .await);
    }

    #[tokio::test]
    async fn listing_without_store_filters_by_workspace() {
        let mut manager = TaskManager::new(None);
        manager.create_task("t-1", Some("ws-a"), None, None).await;
        manager.create_task("t-2", Some("ws-b"), None, None).await;
        manager.create_task("t-3", Some("ws-a"), None, None).await;

        let tasks = manager.list_tasks("ws-a").await;
        assert_eq!(tasks.len(), 2);
        assert!(tasks.iter().all(|t| t.workspace_id.as_deref() == Some("ws-a")));
    }

    #[test]
    fn record_conversion_builds_result() {
        let mut record = TaskRecord::new("ws", "t", "app", "s3://b/k/");
        record.status = BuildStatus::Done;
        record.wasm_path = Some("s3://b/a/t/app.wasm".to_string());
        record.image_url = Some("r/x:abc".to_string());

        let task = task_from_record(record);
        assert_eq!(task.status, TaskState::Completed);
        let result = task.result.unwrap();
        assert_eq!(result.wasm_path.as_deref(), Some("s3://b/a/t/app.wasm"));
        assert_eq!(result.image_uri.as_deref(), Some("r/x:abc"));
    }
}
