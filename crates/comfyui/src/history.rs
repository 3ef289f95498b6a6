//! Typed view of the `GET /history/{prompt_id}` response.
//!
//! The endpoint returns a mapping keyed by prompt id. A job that is still
//! queued or running is simply absent from the mapping (or present with
//! `completed = false`).

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

/// Message used when the engine reports an error without details.
const UNKNOWN_ERROR: &str = "Unknown error";

/// Full history response, keyed by prompt id.
pub type History = HashMap<String, HistoryEntry>;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryEntry {
    #[serde(default)]
    pub status: HistoryStatus,
    /// Per-node outputs, keyed by node id.
    #[serde(default)]
    pub outputs: HashMap<String, NodeOutput>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryStatus {
    #[serde(default)]
    pub completed: bool,
    /// Usually `{"error_message": "..."}`; kept loose because the engine
    /// does not guarantee the shape.
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default)]
    pub status_str: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeOutput {
    #[serde(default)]
    pub images: Vec<ArtifactRef>,
}

/// Reference to one file produced by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ArtifactRef {
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

/// Outcome of one history lookup.
#[derive(Debug, Clone)]
pub enum JobStatus {
    /// Not in the history yet, or not finished.
    Pending,
    Completed(HistoryEntry),
    Failed { message: String },
}

impl JobStatus {
    /// Classify the job `prompt_id` within a history response.
    ///
    /// Completion is checked before the error field, so an entry carrying
    /// both counts as completed.
    pub fn from_history(mut history: History, prompt_id: &str) -> Self {
        let Some(entry) = history.remove(prompt_id) else {
            return JobStatus::Pending;
        };

        if entry.status.completed {
            return JobStatus::Completed(entry);
        }

        if let Some(error) = entry.status.error.as_ref().filter(|e| is_truthy(e)) {
            return JobStatus::Failed {
                message: error_message(error),
            };
        }

        if entry.status.status_str.as_deref() == Some("error") {
            return JobStatus::Failed {
                message: UNKNOWN_ERROR.to_string(),
            };
        }

        JobStatus::Pending
    }
}

impl HistoryEntry {
    /// First artifact produced by `node`, if any.
    pub fn first_artifact(&self, node: &str) -> Option<&ArtifactRef> {
        self.outputs.get(node)?.images.first()
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Number(_) => true,
    }
}

fn error_message(error: &Value) -> String {
    match error {
        Value::String(s) => s.clone(),
        Value::Object(map) => map
            .get("error_message")
            .and_then(Value::as_str)
            .unwrap_or(UNKNOWN_ERROR)
            .to_string(),
        _ => UNKNOWN_ERROR.to_string(),
    }
}
