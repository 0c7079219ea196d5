use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::status::{BuildStatus, TaskState};

/// The durable task record as it lives in the key-value store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub workspace_id: String,
    pub task_id: String,
    pub app_name: String,
    pub status: BuildStatus,
    pub source_code_path: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub wasm_path: Option<String>,
    pub image_url: Option<String>,
    pub error_message: Option<String>,
}

impl TaskRecord {
    pub fn new(
        workspace_id: impl Into<String>,
        task_id: impl Into<String>,
        app_name: impl Into<String>,
        source_code_path: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            workspace_id: workspace_id.into(),
            task_id: task_id.into(),
            app_name: app_name.into(),
            status: BuildStatus::Pending,
            source_code_path: source_code_path.into(),
            created_at: now,
            updated_at: now,
            wasm_path: None,
            image_url: None,
            error_message: None,
        }
    }
}

/// Result payload attached to a task once a stage has produced something.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wasm_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_dir: Option<String>,
}

impl TaskResult {
    pub fn is_empty(&self) -> bool {
        self.wasm_path.is_none() && self.image_uri.is_none() && self.app_dir.is_none()
    }
}

/// In-process view of a task, served back to API callers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub status: TaskState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<TaskResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,
}

impl Task {
    pub fn pending(task_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            task_id: task_id.into(),
            status: TaskState::Pending,
            created_at: now,
            updated_at: now,
            result: None,
            error: None,
            workspace_id: None,
            app_name: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_starts_pending() {
        let record = TaskRecord::new("ws-1", "t-1", "app", "s3://b/k/");
        assert_eq!(record.status, BuildStatus::Pending);
        assert_eq!(record.created_at, record.updated_at);
        assert!(record.wasm_path.is_none());
        assert!(record.error_message.is_none());
    }

    #[test]
    fn empty_result_fields_are_omitted() {
        let task = Task::pending("t-1");
        let json = serde_json::to_value(&task).unwrap();
        assert!(json.get("result").is_none());
        assert!(json.get("error").is_none());
        assert_eq!(json["status"], "pending");
    }
}
