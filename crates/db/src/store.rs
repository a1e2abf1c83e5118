use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use crate::error::StoreError;
use crate::models::{Status, Submission, SubmissionDiff, Task};

/// Subset of submission columns `getSubmissionsByPeriod` may filter on.
/// Arbitrary predicates over `parameters` are deferred (see DESIGN.md).
#[derive(Debug, Clone, Default)]
pub struct PeriodFilter {
    pub route_id: Option<String>,
    pub workflow_id: Option<String>,
    pub status: Option<Status>,
}

#[async_trait]
pub trait SubmissionStore: Send + Sync {
    async fn create(&self, submission: &Submission) -> Result<(), StoreError>;
    async fn get(&self, submission_id: &str) -> Result<Submission, StoreError>;
    async fn apply_diff(
        &self,
        submission_id: &str,
        expected_version: i64,
        diff: &SubmissionDiff,
        now: DateTime<Utc>,
    ) -> Result<i64, StoreError>;
    async fn find_by_period(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        filter: &PeriodFilter,
    ) -> Result<Vec<Submission>, StoreError>;

    /// Lists every submission not in a terminal status, for the Status
    /// Poller's scan. Not part of the core freshness-arbitration contract
    /// in isolation — used only to find candidates for the refresh path.
    async fn list_non_terminal(&self) -> Result<Vec<Submission>, StoreError>;
}

pub struct SqliteSubmissionStore {
    pool: SqlitePool,
}

impl SqliteSubmissionStore {
    pub fn new(pool: SqlitePool) -> Self {
        SqliteSubmissionStore { pool }
    }

    async fn fetch_tasks(pool: &SqlitePool, submission_id: &str) -> Result<Vec<Task>, StoreError> {
        let rows = sqlx::query(
            "SELECT task_id, submission_id, external_task_id, status, started_at, ended_at, \
             order_index, updated_at FROM tasks WHERE submission_id = ? ORDER BY task_id ASC",
        )
        .bind(submission_id)
        .fetch_all(pool)
        .await?;

        rows.iter().map(row_to_task).collect()
    }
}

fn row_to_task(row: &sqlx::sqlite::SqliteRow) -> Result<Task, StoreError> {
    let status_str: String = row.try_get("status")?;
    let started_at: Option<String> = row.try_get("started_at")?;
    let ended_at: Option<String> = row.try_get("ended_at")?;
    let updated_at: String = row.try_get("updated_at")?;
    Ok(Task {
        task_id: row.try_get("task_id")?,
        submission_id: row.try_get("submission_id")?,
        external_task_id: row.try_get("external_task_id")?,
        status: Status::parse(&status_str).unwrap_or(Status::Submitted),
        started_at: started_at.map(|s| parse_timestamp(&s)).transpose()?,
        ended_at: ended_at.map(|s| parse_timestamp(&s)).transpose()?,
        order_index: row.try_get("order_index")?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

fn row_to_submission(row: &sqlx::sqlite::SqliteRow) -> Result<Submission, StoreError> {
    let parameters_json: String = row.try_get("parameters")?;
    let result_json: Option<String> = row.try_get("result")?;
    let status_str: String = row.try_get("status")?;
    let submitted_at: String = row.try_get("submitted_at")?;
    let last_updated_at: String = row.try_get("last_updated_at")?;

    Ok(Submission {
        submission_id: row.try_get("submission_id")?,
        route_id: row.try_get("route_id")?,
        workflow_id: row.try_get("workflow_id")?,
        external_id: row.try_get("external_id")?,
        parameters: serde_json::from_str(&parameters_json)?,
        status: Status::parse(&status_str).unwrap_or(Status::Submitted),
        submitted_at: parse_timestamp(&submitted_at)?,
        last_updated_at: parse_timestamp(&last_updated_at)?,
        error_message: row.try_get("error_message")?,
        result: result_json.map(|s| serde_json::from_str(&s)).transpose()?,
        tasks: Vec::new(),
        version: row.try_get("version")?,
    })
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Backend(sqlx::Error::Decode(Box::new(e))))
}

fn fmt_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

#[async_trait]
impl SubmissionStore for SqliteSubmissionStore {
    async fn create(&self, submission: &Submission) -> Result<(), StoreError> {
        let parameters_json = serde_json::to_string(&submission.parameters)?;
        sqlx::query(
            "INSERT INTO submissions (submission_id, route_id, workflow_id, external_id, \
             parameters, status, submitted_at, last_updated_at, error_message, result, version) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&submission.submission_id)
        .bind(&submission.route_id)
        .bind(&submission.workflow_id)
        .bind(&submission.external_id)
        .bind(parameters_json)
        .bind(submission.status.as_str())
        .bind(fmt_timestamp(submission.submitted_at))
        .bind(fmt_timestamp(submission.last_updated_at))
        .bind(&submission.error_message)
        .bind(submission.result.as_ref().map(serde_json::to_string).transpose()?)
        .bind(submission.version)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, submission_id: &str) -> Result<Submission, StoreError> {
        let row = sqlx::query(
            "SELECT submission_id, route_id, workflow_id, external_id, parameters, status, \
             submitted_at, last_updated_at, error_message, result, version FROM submissions \
             WHERE submission_id = ?",
        )
        .bind(submission_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)?;

        let mut submission = row_to_submission(&row)?;
        submission.tasks = Self::fetch_tasks(&self.pool, submission_id).await?;
        Ok(submission)
    }

    async fn apply_diff(
        &self,
        submission_id: &str,
        expected_version: i64,
        diff: &SubmissionDiff,
        now: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let mut tx = self.pool.begin().await?;

        let current_version: Option<i64> =
            sqlx::query_scalar("SELECT version FROM submissions WHERE submission_id = ?")
                .bind(submission_id)
                .fetch_optional(&mut *tx)
                .await?;
        let current_version = current_version.ok_or(StoreError::NotFound)?;
        if current_version != expected_version {
            return Err(StoreError::Conflict);
        }

        let new_version = current_version + 1;
        let now_str = fmt_timestamp(now);

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE submissions SET ");
        let mut sep = builder.separated(", ");
        sep.push("version = ").push_bind_unseparated(new_version);
        sep.push("last_updated_at = ").push_bind_unseparated(now_str.clone());
        if let Some(status) = diff.root.status {
            sep.push("status = ").push_bind_unseparated(status.as_str());
        }
        if let Some(ref external_id) = diff.root.external_id {
            sep.push("external_id = ").push_bind_unseparated(external_id.clone());
        }
        if let Some(ref error_message) = diff.root.error_message {
            sep.push("error_message = ").push_bind_unseparated(error_message.clone());
        }
        if let Some(ref result) = diff.root.result {
            let result_json = result.as_ref().map(serde_json::to_string).transpose()?;
            sep.push("result = ").push_bind_unseparated(result_json);
        }
        builder.push(" WHERE submission_id = ");
        builder.push_bind(submission_id.to_string());

        builder.build().execute(&mut *tx).await?;

        for removed in &diff.removed_task_ids {
            sqlx::query("DELETE FROM tasks WHERE submission_id = ? AND task_id = ?")
                .bind(submission_id)
                .bind(removed)
                .execute(&mut *tx)
                .await?;
        }

        for inserted in &diff.inserted_tasks {
            sqlx::query(
                "INSERT INTO tasks (task_id, submission_id, external_task_id, status, \
                 started_at, ended_at, order_index, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&inserted.task_id)
            .bind(submission_id)
            .bind(&inserted.external_task_id)
            .bind(inserted.status.as_str())
            .bind(inserted.started_at.map(fmt_timestamp))
            .bind(inserted.ended_at.map(fmt_timestamp))
            .bind(inserted.order_index)
            .bind(fmt_timestamp(inserted.updated_at))
            .execute(&mut *tx)
            .await?;
        }

        for task_diff in &diff.task_diffs {
            if task_diff.is_empty() {
                continue;
            }
            let mut tb: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE tasks SET ");
            let mut tsep = tb.separated(", ");
            tsep.push("updated_at = ").push_bind_unseparated(now_str.clone());
            if let Some(status) = task_diff.status {
                tsep.push("status = ").push_bind_unseparated(status.as_str());
            }
            if let Some(ref external_task_id) = task_diff.external_task_id {
                tsep.push("external_task_id = ").push_bind_unseparated(external_task_id.clone());
            }
            if let Some(started_at) = task_diff.started_at {
                tsep.push("started_at = ").push_bind_unseparated(started_at.map(fmt_timestamp));
            }
            if let Some(ended_at) = task_diff.ended_at {
                tsep.push("ended_at = ").push_bind_unseparated(ended_at.map(fmt_timestamp));
            }
            if let Some(order_index) = task_diff.order_index {
                tb.push(", order_index = ");
                tb.push_bind(order_index);
            }
            tb.push(" WHERE submission_id = ");
            tb.push_bind(submission_id.to_string());
            tb.push(" AND task_id = ");
            tb.push_bind(task_diff.task_id.clone());

            tb.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(new_version)
    }

    async fn find_by_period(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        filter: &PeriodFilter,
    ) -> Result<Vec<Submission>, StoreError> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT submission_id, route_id, workflow_id, external_id, parameters, status, \
             submitted_at, last_updated_at, error_message, result, version FROM submissions \
             WHERE submitted_at >= ",
        );
        builder.push_bind(fmt_timestamp(from));
        builder.push(" AND submitted_at < ");
        builder.push_bind(fmt_timestamp(to));

        if let Some(ref route_id) = filter.route_id {
            builder.push(" AND route_id = ");
            builder.push_bind(route_id.clone());
        }
        if let Some(ref workflow_id) = filter.workflow_id {
            builder.push(" AND workflow_id = ");
            builder.push_bind(workflow_id.clone());
        }
        if let Some(status) = filter.status {
            builder.push(" AND status = ");
            builder.push_bind(status.as_str());
        }
        builder.push(" ORDER BY submitted_at ASC, submission_id ASC");

        let rows = builder.build().fetch_all(&self.pool).await?;
        let mut submissions = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut submission = row_to_submission(row)?;
            submission.tasks = Self::fetch_tasks(&self.pool, &submission.submission_id).await?;
            submissions.push(submission);
        }
        Ok(submissions)
    }

    async fn list_non_terminal(&self) -> Result<Vec<Submission>, StoreError> {
        let rows = sqlx::query(
            "SELECT submission_id, route_id, workflow_id, external_id, parameters, status, \
             submitted_at, last_updated_at, error_message, result, version FROM submissions \
             WHERE status NOT IN ('COMPLETED', 'FAILED', 'CANCELLED') \
             ORDER BY last_updated_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut submissions = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut submission = row_to_submission(row)?;
            submission.tasks = Self::fetch_tasks(&self.pool, &submission.submission_id).await?;
            submissions.push(submission);
        }
        Ok(submissions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SubmissionFieldChanges;
    use chrono::Duration;

    fn sample_submission(id: &str, route_id: &str, submitted_at: DateTime<Utc>) -> Submission {
        Submission::new(
            id.to_string(),
            route_id.to_string(),
            "W".to_string(),
            serde_json::Map::new(),
            submitted_at,
        )
    }

    #[tokio::test]
    async fn apply_diff_increments_version_by_one() {
        let (pool, _dir) = crate::test_utils::setup_test_pool().await;
        let store = SqliteSubmissionStore::new(pool);
        let now = Utc::now();
        let submission = sample_submission("s1", "R1", now);
        store.create(&submission).await.unwrap();

        let mut diff = SubmissionDiff::default();
        diff.root.status = Some(Status::Queued);
        diff.root.external_id = Some("X-1".to_string());

        let new_version = store.apply_diff("s1", 1, &diff, now + Duration::seconds(1)).await.unwrap();
        assert_eq!(new_version, 2);

        let stored = store.get("s1").await.unwrap();
        assert_eq!(stored.version, 2);
        assert_eq!(stored.status, Status::Queued);
        assert_eq!(stored.external_id.as_deref(), Some("X-1"));
    }

    #[tokio::test]
    async fn apply_diff_with_stale_expected_version_conflicts() {
        let (pool, _dir) = crate::test_utils::setup_test_pool().await;
        let store = SqliteSubmissionStore::new(pool);
        let now = Utc::now();
        let submission = sample_submission("s1", "R1", now);
        store.create(&submission).await.unwrap();

        let diff = SubmissionDiff {
            root: SubmissionFieldChanges {
                status: Some(Status::Queued),
                ..Default::default()
            },
            ..Default::default()
        };

        let err = store.apply_diff("s1", 99, &diff, now).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict));
    }

    #[tokio::test]
    async fn selective_update_touches_only_changed_columns() {
        let (pool, _dir) = crate::test_utils::setup_test_pool().await;
        let store = SqliteSubmissionStore::new(pool);
        let now = Utc::now();
        let mut submission = sample_submission("s1", "R1", now);
        submission.error_message = Some("boom".to_string());
        store.create(&submission).await.unwrap();

        let diff = SubmissionDiff {
            root: SubmissionFieldChanges {
                status: Some(Status::Running),
                ..Default::default()
            },
            ..Default::default()
        };
        store.apply_diff("s1", 1, &diff, now + Duration::seconds(1)).await.unwrap();

        let stored = store.get("s1").await.unwrap();
        assert_eq!(stored.status, Status::Running);
        assert_eq!(stored.error_message.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn find_by_period_orders_and_bounds_correctly() {
        let (pool, _dir) = crate::test_utils::setup_test_pool().await;
        let store = SqliteSubmissionStore::new(pool);
        let t0 = Utc::now();
        let t1 = t0 + Duration::seconds(1);
        let t2 = t0 + Duration::seconds(2);

        store.create(&sample_submission("s1", "R1", t0)).await.unwrap();
        store.create(&sample_submission("s2", "R2", t1)).await.unwrap();
        store.create(&sample_submission("s3", "R1", t2)).await.unwrap();

        let filter = PeriodFilter {
            route_id: Some("R1".to_string()),
            ..Default::default()
        };
        let results = store.find_by_period(t0, t2, &filter).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].submission_id, "s1");
    }
}
