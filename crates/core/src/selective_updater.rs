use std::sync::Arc;

use chrono::{DateTime, Utc};
use router_db::error::StoreError;
use router_db::models::Submission;
use router_db::store::SubmissionStore;
use router_drivers::RemoteStatus;
use thiserror::Error;

use crate::change_detector::compute_diff;

const MAX_APPLY_ATTEMPTS: u32 = 3;

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("submission not found")]
    NotFound,
    #[error("update contended after {0} attempts")]
    Contended(u32),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub enum UpdateOutcome {
    /// The diff was non-empty and has been persisted; carries the
    /// resulting in-memory snapshot.
    Updated(Submission),
    /// The incoming status produced no diff (terminal submission or
    /// out-of-order guard); carries the unchanged stored snapshot.
    Unchanged(Submission),
}

impl UpdateOutcome {
    pub fn submission(&self) -> &Submission {
        match self {
            UpdateOutcome::Updated(s) | UpdateOutcome::Unchanged(s) => s,
        }
    }
}

/// Wraps `SubmissionStore::apply_diff` with retry-on-conflict: on a
/// version conflict, re-reads the submission, re-runs the change detector
/// against the now-current snapshot, and re-applies. Bounded to three
/// attempts before surfacing `Contended`.
pub struct SelectiveUpdater {
    store: Arc<dyn SubmissionStore>,
}

impl SelectiveUpdater {
    pub fn new(store: Arc<dyn SubmissionStore>) -> Self {
        SelectiveUpdater { store }
    }

    pub async fn apply(
        &self,
        submission_id: &str,
        incoming: &RemoteStatus,
        now: DateTime<Utc>,
    ) -> Result<UpdateOutcome, UpdateError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let stored = match self.store.get(submission_id).await {
                Ok(s) => s,
                Err(StoreError::NotFound) => return Err(UpdateError::NotFound),
                Err(e) => return Err(UpdateError::Store(e)),
            };

            let diff = compute_diff(&stored, incoming);
            if diff.is_empty() {
                return Ok(UpdateOutcome::Unchanged(stored));
            }

            match self
                .store
                .apply_diff(submission_id, stored.version, &diff, now)
                .await
            {
                Ok(new_version) => {
                    let mut updated = stored;
                    updated.apply_diff(&diff, new_version, now);
                    return Ok(UpdateOutcome::Updated(updated));
                }
                Err(StoreError::Conflict) if attempt < MAX_APPLY_ATTEMPTS => continue,
                Err(StoreError::Conflict) => return Err(UpdateError::Contended(attempt)),
                Err(StoreError::NotFound) => return Err(UpdateError::NotFound),
                Err(e) => return Err(UpdateError::Store(e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use router_db::models::Status;
    use router_db::test_utils::setup_test_pool;
    use router_db::SqliteSubmissionStore;

    fn sample_submission(id: &str, submitted_at: DateTime<Utc>) -> Submission {
        Submission::new(
            id.to_string(),
            "R1".to_string(),
            "W".to_string(),
            serde_json::Map::new(),
            submitted_at,
        )
    }

    fn remote(status: Status, reported_at: DateTime<Utc>) -> RemoteStatus {
        RemoteStatus {
            status,
            result: None,
            tasks: Vec::new(),
            reported_at,
        }
    }

    #[tokio::test]
    async fn apply_persists_a_genuine_status_change() {
        let (pool, _dir) = setup_test_pool().await;
        let store: Arc<dyn SubmissionStore> = Arc::new(SqliteSubmissionStore::new(pool));
        let now = Utc::now();
        store.create(&sample_submission("s1", now)).await.unwrap();

        let updater = SelectiveUpdater::new(store);
        let later = now + chrono::Duration::seconds(1);
        let outcome = updater.apply("s1", &remote(Status::Running, later), later).await.unwrap();
        match outcome {
            UpdateOutcome::Updated(s) => assert_eq!(s.status, Status::Running),
            UpdateOutcome::Unchanged(_) => panic!("expected an update"),
        }
    }

    #[tokio::test]
    async fn apply_on_terminal_submission_is_unchanged() {
        let (pool, _dir) = setup_test_pool().await;
        let store: Arc<dyn SubmissionStore> = Arc::new(SqliteSubmissionStore::new(pool));
        let now = Utc::now();
        store.create(&sample_submission("s1", now)).await.unwrap();

        let updater = SelectiveUpdater::new(store.clone());
        let completed_at = now + chrono::Duration::seconds(1);
        updater
            .apply("s1", &remote(Status::Completed, completed_at), completed_at)
            .await
            .unwrap();

        let later = completed_at + chrono::Duration::seconds(1);
        let outcome = updater.apply("s1", &remote(Status::Running, later), later).await.unwrap();
        match outcome {
            UpdateOutcome::Unchanged(s) => assert_eq!(s.status, Status::Completed),
            UpdateOutcome::Updated(_) => panic!("terminal submission must not update again"),
        }
    }

    #[tokio::test]
    async fn apply_on_unknown_submission_returns_not_found() {
        let (pool, _dir) = setup_test_pool().await;
        let store: Arc<dyn SubmissionStore> = Arc::new(SqliteSubmissionStore::new(pool));
        let updater = SelectiveUpdater::new(store);
        let err = updater
            .apply("missing", &remote(Status::Running, Utc::now()), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, UpdateError::NotFound));
    }
}
