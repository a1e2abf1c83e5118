use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Status;

/// Child of a `Submission`. Identity equality is by `taskId`; a task never
/// exists without a parent submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub task_id: String,
    pub submission_id: String,
    pub external_task_id: Option<String>,
    pub status: Status,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub order_index: i64,
    pub updated_at: DateTime<Utc>,
}
