use serde::{Deserialize, Serialize};

/// Fine-grained build lifecycle status, persisted verbatim in the task store.
///
/// PENDING -> BUILDING -> PUSHING -> DONE | FAILED, with PUSHING skipped on
/// build-only pipelines and BUILDING skipped on push-only pipelines. DONE and
/// FAILED are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildStatus {
    Pending,
    Building,
    Pushing,
    Done,
    Failed,
}

impl BuildStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStatus::Pending => "PENDING",
            BuildStatus::Building => "BUILDING",
            BuildStatus::Pushing => "PUSHING",
            BuildStatus::Done => "DONE",
            BuildStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BuildStatus::Done | BuildStatus::Failed)
    }
}

impl std::fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse task state exposed over the HTTP API.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Running => "running",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
        }
    }
}

impl From<BuildStatus> for TaskState {
    fn from(status: BuildStatus) -> Self {
        match status {
            BuildStatus::Pending => TaskState::Pending,
            BuildStatus::Building | BuildStatus::Pushing => TaskState::Running,
            BuildStatus::Done => TaskState::Completed,
            BuildStatus::Failed => TaskState::Failed,
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_status_serializes_uppercase() {
        assert_eq!(
            serde_json::to_string(&BuildStatus::Building).unwrap(),
            "\"BUILDING\""
        );
        assert_eq!(
            serde_json::from_str::<BuildStatus>("\"DONE\"").unwrap(),
            BuildStatus::Done
        );
    }

    #[test]
    fn task_state_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&TaskState::Completed).unwrap(),
            "\"completed\""
        );
    }

    #[test]
    fn pushing_maps_to_running() {
        assert_eq!(TaskState::from(BuildStatus::Pushing), TaskState::Running);
        assert_eq!(TaskState::from(BuildStatus::Building), TaskState::Running);
        assert_eq!(TaskState::from(BuildStatus::Done), TaskState::Completed);
    }

    #[test]
    fn terminal_states() {
        assert!(BuildStatus::Done.is_terminal());
        assert!(BuildStatus::Failed.is_terminal());
        assert!(!BuildStatus::Pushing.is_terminal());
    }
}
