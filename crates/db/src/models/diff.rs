use chrono::{DateTime, Utc};
use serde_json::Map as JsonMap;
use serde_json::Value;

use super::{Status, Task};

/// Changed root fields of a `Submission`, produced by the change detector
/// and consumed by `SubmissionStore::apply_diff`. `None` means unchanged.
/// `result`/`error_message` use `Option<Option<_>>` so a diff can
/// distinguish "leave as-is" from "set to null".
#[derive(Debug, Clone, Default)]
pub struct SubmissionFieldChanges {
    pub status: Option<Status>,
    pub external_id: Option<String>,
    pub error_message: Option<Option<String>>,
    pub result: Option<Option<JsonMap<String, Value>>>,
}

impl SubmissionFieldChanges {
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.external_id.is_none()
            && self.error_message.is_none()
            && self.result.is_none()
    }
}

/// Changed fields of one `Task`, matched against the stored row by
/// `taskId`.
#[derive(Debug, Clone, Default)]
pub struct TaskDiff {
    pub task_id: String,
    pub status: Option<Status>,
    pub external_task_id: Option<Option<String>>,
    pub started_at: Option<Option<DateTime<Utc>>>,
    pub ended_at: Option<Option<DateTime<Utc>>>,
    pub order_index: Option<i64>,
}

impl TaskDiff {
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.external_task_id.is_none()
            && self.started_at.is_none()
            && self.ended_at.is_none()
            && self.order_index.is_none()
    }
}

/// The structured description of what changed between a stored and an
/// incoming `Submission` snapshot. This is the only shape that flows into
/// `SubmissionStore::apply_diff`; the store never accepts a whole-row
/// overwrite.
#[derive(Debug, Clone, Default)]
pub struct SubmissionDiff {
    pub root: SubmissionFieldChanges,
    pub inserted_tasks: Vec<Task>,
    pub removed_task_ids: Vec<String>,
    pub task_diffs: Vec<TaskDiff>,
}

impl SubmissionDiff {
    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
            && self.inserted_tasks.is_empty()
            && self.removed_task_ids.is_empty()
            && self.task_diffs.iter().all(TaskDiff::is_empty)
    }
}
