//! The executor→manager callback payload and dispatch tag.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Dispatch tag for `CallbackHandler`. Anything that does not match
/// `Validation` or `Sandbox` is routed to the back-end as a regular task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Validation,
    Sandbox,
    Regular,
}

impl TaskType {
    /// Parses the wire `task_type` field; anything unrecognized is
    /// `Regular`, matching the handler's "anything else" branch.
    pub fn from_wire(value: Option<&str>) -> Self {
        match value {
            Some("validation") => Self::Validation,
            Some("sandbox") => Self::Sandbox,
            _ => Self::Regular,
        }
    }
}

/// Flat callback body. Optional fields are dropped (not serialized as
/// `null`) when absent, matching `callback_client.py`'s `build_payload`
/// helper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackPayload {
    pub task_id: String,
    pub subtask_id: String,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executor_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executor_namespace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sandbox_metadata: Option<Map<String, Value>>,
}
