use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Map as JsonMap;
use serde_json::Value;

use super::{Status, Task};

/// The central tracked entity: one request to run a workflow on a route's
/// endpoint, from submission through to a terminal outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub submission_id: String,
    pub route_id: String,
    pub workflow_id: String,
    pub external_id: Option<String>,
    pub parameters: JsonMap<String, Value>,
    pub status: Status,
    pub submitted_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    pub error_message: Option<String>,
    pub result: Option<JsonMap<String, Value>>,
    pub tasks: Vec<Task>,
    pub version: i64,
}

impl Submission {
    /// Builds the initial row for a freshly accepted submission: version 1,
    /// status SUBMITTED, no external id or result yet.
    pub fn new(
        submission_id: String,
        route_id: String,
        workflow_id: String,
        parameters: JsonMap<String, Value>,
        now: DateTime<Utc>,
    ) -> Self {
        Submission {
            submission_id,
            route_id,
            workflow_id,
            external_id: None,
            parameters,
            status: Status::Submitted,
            submitted_at: now,
            last_updated_at: now,
            error_message: None,
            result: None,
            tasks: Vec::new(),
            version: 1,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Find a task by id; tasks are identity-equal by `taskId`.
    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.task_id == task_id)
    }

    /// Mirrors, in memory, the column-scoped mutation the Submission Store
    /// performs for the same diff. Used so callers can hold an up-to-date
    /// snapshot without a round trip back to the store after a write.
    pub fn apply_diff(&mut self, diff: &super::SubmissionDiff, new_version: i64, now: DateTime<Utc>) {
        if let Some(status) = diff.root.status {
            self.status = status;
        }
        if let Some(ref error_message) = diff.root.error_message {
            self.error_message = error_message.clone();
        }
        if let Some(ref result) = diff.root.result {
            self.result = result.clone();
        }
        if let Some(ref external_id) = diff.root.external_id {
            self.external_id = Some(external_id.clone());
        }
        self.version = new_version;
        self.last_updated_at = now;

        self.tasks.retain(|t| !diff.removed_task_ids.contains(&t.task_id));
        for task_diff in &diff.task_diffs {
            if let Some(task) = self.tasks.iter_mut().find(|t| t.task_id == task_diff.task_id) {
                if let Some(status) = task_diff.status {
                    task.status = status;
                }
                if let Some(ref ext) = task_diff.external_task_id {
                    task.external_task_id = ext.clone();
                }
                if let Some(started_at) = task_diff.started_at {
                    task.started_at = started_at;
                }
                if let Some(ended_at) = task_diff.ended_at {
                    task.ended_at = ended_at;
                }
                if let Some(order_index) = task_diff.order_index {
                    task.order_index = order_index;
                }
                task.updated_at = now;
            }
        }
        self.tasks.extend(diff.inserted_tasks.iter().cloned());
        self.tasks.sort_by(|a, b| a.task_id.cmp(&b.task_id));
    }
}
