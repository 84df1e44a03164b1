//! Metadata tracked for live non-sandbox tasks.

use serde::{Deserialize, Serialize};

/// Paired hash entry stored alongside a `running_tasks:heartbeat` ZSet
/// member, grounded in `task_heartbeat_manager.py::add_running_task`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskMetadata {
    pub task_id: String,
    pub subtask_id: Option<String>,
    pub executor_name: String,
    pub task_type: Option<String>,
    /// Unix seconds; doubles as the ZSet score.
    pub start_time: i64,
}

impl TaskMetadata {
    pub fn new(
        task_id: impl Into<String>,
        subtask_id: Option<String>,
        executor_name: impl Into<String>,
        task_type: Option<String>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            subtask_id,
            executor_name: executor_name.into(),
            task_type,
            start_time: chrono::Utc::now().timestamp(),
        }
    }
}
