use chrono::{DateTime, Utc};
use faas_deploy::ServiceStatus;
use faas_types::{Task, TaskResult, TaskState};
use serde::{Deserialize, Serialize};

/// 202 envelope for the build, push, and build-and-push endpoints.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskAccepted {
    pub task_id: String,
    pub status: TaskState,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_s3_path: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskStatusResponse {
    pub task_id: String,
    pub status: TaskState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<TaskResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Task> for TaskStatusResponse {
    fn from(task: Task) -> Self {
        Self {
            task_id: task.task_id,
            status: task.status,
            result: task.result,
            error: task.error,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkspaceTaskEntry {
    pub task_id: String,
    pub status: TaskState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<TaskResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Task> for WorkspaceTaskEntry {
    fn from(task: Task) -> Self {
        Self {
            task_id: task.task_id,
            status: task.status,
            app_name: task.app_name,
            created_at: task.created_at,
            updated_at: task.updated_at,
            result: task.result,
            error: task.error,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkspaceTasksResponse {
    pub workspace_id: String,
    pub tasks: Vec<WorkspaceTaskEntry>,
    pub count: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeployResponse {
    pub app_name: String,
    pub namespace: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    pub service_status: ServiceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    pub enable_autoscaling: bool,
    pub use_spot: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
