mod submission;
mod task;
mod diff;

pub use submission::Submission;
pub use task::Task;
pub use diff::{SubmissionDiff, SubmissionFieldChanges, TaskDiff};

use serde::{Deserialize, Serialize};

/// Lifecycle status shared by submissions and their child tasks.
///
/// Serialised on the wire as the uppercase tokens from the data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Submitted,
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl Status {
    /// A submission/task in one of these statuses never transitions again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Completed | Status::Failed | Status::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Submitted => "SUBMITTED",
            Status::Queued => "QUEUED",
            Status::Running => "RUNNING",
            Status::Completed => "COMPLETED",
            Status::Failed => "FAILED",
            Status::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Status> {
        match s {
            "SUBMITTED" => Some(Status::Submitted),
            "QUEUED" => Some(Status::Queued),
            "RUNNING" => Some(Status::Running),
            "COMPLETED" => Some(Status::Completed),
            "FAILED" => Some(Status::Failed),
            "CANCELLED" => Some(Status::Cancelled),
            _ => None,
        }
    }
}
