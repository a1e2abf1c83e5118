use chrono::{DateTime, Utc};
use router_db::models::{Submission, SubmissionDiff, SubmissionFieldChanges, Task, TaskDiff};
use router_drivers::{RemoteStatus, RemoteTask};

/// Compares a stored `Submission` snapshot against an incoming
/// `RemoteStatus` and produces the minimal diff needed to bring the store
/// up to date. Never mutates its inputs; pure function over two snapshots.
pub fn compute_diff(stored: &Submission, incoming: &RemoteStatus) -> SubmissionDiff {
    // Terminality: a terminal submission's status/result/tasks never change again.
    if stored.is_terminal() {
        return SubmissionDiff::default();
    }

    // Out-of-order guard: discard callbacks/polls older than what we already have.
    if truncate_to_seconds(incoming.reported_at) < truncate_to_seconds(stored.last_updated_at) {
        return SubmissionDiff::default();
    }

    let mut root = SubmissionFieldChanges::default();
    if incoming.status != stored.status {
        root.status = Some(incoming.status);
    }
    if !results_equal(stored.result.as_ref(), incoming.result.as_ref()) {
        root.result = Some(incoming.result.clone());
    }

    let mut inserted_tasks = Vec::new();
    let mut removed_task_ids = Vec::new();
    let mut task_diffs = Vec::new();

    for incoming_task in &incoming.tasks {
        match stored.task(&incoming_task.task_id) {
            None => inserted_tasks.push(remote_task_to_task(
                incoming_task,
                &stored.submission_id,
                incoming.reported_at,
            )),
            Some(stored_task) => {
                let diff = diff_task(stored_task, incoming_task);
                if !diff.is_empty() {
                    task_diffs.push(diff);
                }
            }
        }
    }

    for stored_task in &stored.tasks {
        if !incoming.tasks.iter().any(|t| t.task_id == stored_task.task_id) {
            removed_task_ids.push(stored_task.task_id.clone());
        }
    }

    SubmissionDiff {
        root,
        inserted_tasks,
        removed_task_ids,
        task_diffs,
    }
}

fn truncate_to_seconds(ts: DateTime<Utc>) -> i64 {
    ts.timestamp()
}

fn results_equal(
    a: Option<&serde_json::Map<String, serde_json::Value>>,
    b: Option<&serde_json::Map<String, serde_json::Value>>,
) -> bool {
    match (a, b) {
        (None, None) => true,
        (None, Some(m)) | (Some(m), None) => m.is_empty(),
        (Some(a), Some(b)) => a == b,
    }
}

fn remote_task_to_task(remote: &RemoteTask, submission_id: &str, reported_at: DateTime<Utc>) -> Task {
    Task {
        task_id: remote.task_id.clone(),
        submission_id: submission_id.to_string(),
        external_task_id: remote.external_task_id.clone(),
        status: remote.status,
        started_at: remote.started_at,
        ended_at: remote.ended_at,
        order_index: remote.order_index,
        updated_at: reported_at,
    }
}

fn diff_task(stored: &Task, incoming: &RemoteTask) -> TaskDiff {
    let mut diff = TaskDiff {
        task_id: stored.task_id.clone(),
        ..Default::default()
    };
    if incoming.status != stored.status {
        diff.status = Some(incoming.status);
    }
    if incoming.external_task_id != stored.external_task_id {
        diff.external_task_id = Some(incoming.external_task_id.clone());
    }
    if !timestamps_equal(stored.started_at, incoming.started_at) {
        diff.started_at = Some(incoming.started_at);
    }
    if !timestamps_equal(stored.ended_at, incoming.ended_at) {
        diff.ended_at = Some(incoming.ended_at);
    }
    if incoming.order_index != stored.order_index {
        diff.order_index = Some(incoming.order_index);
    }
    diff
}

fn timestamps_equal(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => truncate_to_seconds(a) == truncate_to_seconds(b),
        _ => false,
    }
}
