use std::sync::Arc;

use chrono::{DateTime, Utc};
use router_db::error::StoreError;
use router_db::models::{Status, Submission, SubmissionDiff, SubmissionFieldChanges};
use router_db::store::{PeriodFilter, SubmissionStore};
use router_drivers::{DriverSelector, PollError, RemoteStatus, SubmitError};
use serde_json::{Map as JsonMap, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::{ttl_for, ResponseCache};
use crate::config::RouterConfig;
use crate::error::RouterError;
use crate::registry::RouteRegistry;
use crate::selective_updater::{SelectiveUpdater, UpdateError, UpdateOutcome};

/// Orchestrates submit, getStatus, and getByPeriod; arbitrates cache/db/
/// endpoint freshness; owns the per-submission refresh lease protocol.
/// Constructed once at startup from explicitly-passed component handles —
/// no process-global state.
pub struct RouterCore {
    registry: Arc<RouteRegistry>,
    store: Arc<dyn SubmissionStore>,
    selector: Arc<DriverSelector>,
    cache: Arc<dyn ResponseCache>,
    updater: SelectiveUpdater,
    config: RouterConfig,
}

impl RouterCore {
    pub fn new(
        registry: Arc<RouteRegistry>,
        store: Arc<dyn SubmissionStore>,
        selector: Arc<DriverSelector>,
        cache: Arc<dyn ResponseCache>,
        config: RouterConfig,
    ) -> Self {
        RouterCore {
            registry,
            store: store.clone(),
            selector,
            cache,
            updater: SelectiveUpdater::new(store),
            config,
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub async fn submit_workflow(
        &self,
        route_id: &str,
        workflow_id: &str,
        parameters: JsonMap<String, Value>,
        now: DateTime<Utc>,
    ) -> Result<String, RouterError> {
        if parameters.len() > self.config.max_parameters {
            return Err(RouterError::InvalidParameters(format!(
                "parameter map exceeds {} entries",
                self.config.max_parameters
            )));
        }

        let route = self
            .registry
            .lookup(route_id)
            .map_err(|_| RouterError::UnknownRoute(route_id.to_string()))?;

        let submission_id = Uuid::new_v4().to_string();
        let submission = Submission::new(
            submission_id.clone(),
            route_id.to_string(),
            workflow_id.to_string(),
            parameters,
            now,
        );

        self.store
            .create(&submission)
            .await
            .map_err(|e| RouterError::Internal(format!("failed to persist submission: {e}")))?;

        let driver = self
            .selector
            .resolve(&route.endpoint_type)
            .map_err(|e| RouterError::Internal(e.to_string()))?;

        let submit_result = driver
            .submit(&route, workflow_id, &submission.parameters)
            .await;

        let (diff, submit_err) = match submit_result {
            Ok(external_id) => {
                info!(submission_id = %submission_id, route_id, external_id = %external_id, "submission accepted by endpoint");
                let diff = SubmissionDiff {
                    root: SubmissionFieldChanges {
                        status: Some(Status::Queued),
                        external_id: Some(external_id),
                        ..Default::default()
                    },
                    ..Default::default()
                };
                (diff, None)
            }
            Err(e) => {
                warn!(submission_id = %submission_id, route_id, error = %e, "submit to endpoint failed");
                let diff = SubmissionDiff {
                    root: SubmissionFieldChanges {
                        status: Some(Status::Failed),
                        error_message: Some(Some(submit_error_message(&e))),
                        ..Default::default()
                    },
                    ..Default::default()
                };
                (diff, Some(e))
            }
        };

        let new_version = self
            .store
            .apply_diff(&submission_id, submission.version, &diff, now)
            .await
            .map_err(|e| RouterError::Internal(format!("failed to record submit outcome: {e}")))?;

        let mut final_submission = submission;
        final_submission.apply_diff(&diff, new_version, now);

        let ttl = ttl_for(
            final_submission.is_terminal(),
            route.status_threshold_seconds,
            self.config.terminal_ttl,
            self.config.non_terminal_ttl,
        );
        if let Err(e) = self.cache.put(&final_submission, ttl).await {
            warn!(submission_id = %submission_id, error = %e, "failed to populate cache after submit");
        }

        match submit_err {
            Some(e) => Err(RouterError::SubmitFailed(submit_error_message(&e))),
            None => Ok(submission_id),
        }
    }

    pub async fn get_submission_status(
        &self,
        submission_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Submission, RouterError> {
        match self.cache.get(submission_id).await {
            Ok(Some(cached)) => {
                if cached.is_terminal() {
                    return Ok(cached);
                }
                if let Ok(route) = self.registry.lookup(&cached.route_id) {
                    if within_threshold(cached.last_updated_at, now, route.status_threshold_seconds) {
                        return Ok(cached);
                    }
                }
            }
            Ok(None) => {}
            Err(e) => warn!(submission_id, error = %e, "cache read failed, falling through to store"),
        }

        let stored = self
            .store
            .get(submission_id)
            .await
            .map_err(|e| match e {
                StoreError::NotFound => RouterError::NotFound,
                other => RouterError::Internal(other.to_string()),
            })?;

        let route = self
            .registry
            .lookup(&stored.route_id)
            .map_err(|_| RouterError::UnknownRoute(stored.route_id.clone()))?;

        if stored.is_terminal() {
            self.repopulate_cache(&stored, &route, now).await;
            return Ok(stored);
        }

        if within_threshold(stored.last_updated_at, now, route.status_threshold_seconds) {
            self.repopulate_cache(&stored, &route, now).await;
            return Ok(stored);
        }

        self.refresh_by_poll(stored, now).await
    }

    pub async fn get_submissions_by_period(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        filter: &PeriodFilter,
    ) -> Result<Vec<Submission>, RouterError> {
        self.store
            .find_by_period(from, to, filter)
            .await
            .map_err(|e| RouterError::Internal(e.to_string()))
    }

    /// Accepts an endpoint-initiated callback: resolves the route,
    /// authenticates/parses the payload via the driver, then feeds the
    /// result into the same refresh path used by the poller (under the
    /// same per-submission lease, deduplicating poller/callback races).
    pub async fn handle_callback(
        &self,
        route_id: &str,
        payload: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Submission, RouterError> {
        let route = self
            .registry
            .lookup(route_id)
            .map_err(|_| RouterError::UnknownRoute(route_id.to_string()))?;
        let driver = self
            .selector
            .resolve(&route.endpoint_type)
            .map_err(|e| RouterError::Internal(e.to_string()))?;

        let (submission_id, remote_status) = driver
            .verify_callback(&route, payload)
            .await
            .map_err(|e| RouterError::InvalidCallback(e.to_string()))?;

        self.refresh_with_status(&submission_id, remote_status, now).await
    }

    /// Periodic poller calls this for each stale, non-leased submission.
    pub async fn refresh_stale(&self, submission_id: &str, now: DateTime<Utc>) -> Result<Submission, RouterError> {
        let stored = self
            .store
            .get(submission_id)
            .await
            .map_err(|e| match e {
                StoreError::NotFound => RouterError::NotFound,
                other => RouterError::Internal(other.to_string()),
            })?;
        self.refresh_by_poll(stored, now).await
    }

    async fn refresh_by_poll(&self, stored: Submission, now: DateTime<Utc>) -> Result<Submission, RouterError> {
        let submission_id = stored.submission_id.clone();
        let lease = self
            .cache
            .try_acquire_lease(&submission_id, self.config.refresh_lease_ttl)
            .await
            .unwrap_or(None);

        let Some(token) = lease else {
            debug!(submission_id = %submission_id, "refresh lease already held, returning stored value");
            return Ok(stored);
        };

        let route = match self.registry.lookup(&stored.route_id) {
            Ok(route) => route,
            Err(_) => {
                let _ = self.cache.release_lease(&submission_id, &token).await;
                return Err(RouterError::UnknownRoute(stored.route_id.clone()));
            }
        };

        let Some(external_id) = stored.external_id.clone() else {
            let _ = self.cache.release_lease(&submission_id, &token).await;
            return Ok(stored);
        };

        let driver = match self.selector.resolve(&route.endpoint_type) {
            Ok(driver) => driver,
            Err(e) => {
                let _ = self.cache.release_lease(&submission_id, &token).await;
                return Err(RouterError::Internal(e.to_string()));
            }
        };

        let poll_result = driver.poll_status(&route, &external_id).await;
        let outcome = self.handle_poll_result(&submission_id, &route, poll_result, now).await;
        let _ = self.cache.release_lease(&submission_id, &token).await;
        outcome
    }

    async fn refresh_with_status(
        &self,
        submission_id: &str,
        remote_status: RemoteStatus,
        now: DateTime<Utc>,
    ) -> Result<Submission, RouterError> {
        let stored = self
            .store
            .get(submission_id)
            .await
            .map_err(|e| match e {
                StoreError::NotFound => RouterError::NotFound,
                other => RouterError::Internal(other.to_string()),
            })?;

        let route = self
            .registry
            .lookup(&stored.route_id)
            .map_err(|_| RouterError::UnknownRoute(stored.route_id.clone()))?;

        let lease = self
            .cache
            .try_acquire_lease(submission_id, self.config.refresh_lease_ttl)
            .await
            .unwrap_or(None);

        let Some(token) = lease else {
            debug!(submission_id, "refresh lease already held, dropping callback race");
            return Ok(stored);
        };

        let outcome = self.apply_remote_status(submission_id, &route, remote_status, now).await;
        let _ = self.cache.release_lease(submission_id, &token).await;
        outcome
    }

    async fn handle_poll_result(
        &self,
        submission_id: &str,
        route: &router_drivers::RouteConfig,
        poll_result: Result<RemoteStatus, PollError>,
        now: DateTime<Utc>,
    ) -> Result<Submission, RouterError> {
        match poll_result {
            Ok(remote_status) => self.apply_remote_status(submission_id, route, remote_status, now).await,
            Err(PollError::NotFound) => {
                let stored = self
                    .store
                    .get(submission_id)
                    .await
                    .map_err(|e| RouterError::Internal(e.to_string()))?;
                let diff = SubmissionDiff {
                    root: SubmissionFieldChanges {
                        status: Some(Status::Failed),
                        error_message: Some(Some("endpoint reports externalId unknown".to_string())),
                        ..Default::default()
                    },
                    ..Default::default()
                };
                let new_version = self
                    .store
                    .apply_diff(submission_id, stored.version, &diff, now)
                    .await
                    .map_err(|e| RouterError::Internal(e.to_string()))?;
                let mut updated = stored;
                updated.apply_diff(&diff, new_version, now);
                self.repopulate_cache(&updated, route, now).await;
                Ok(updated)
            }
            Err(e @ (PollError::Unavailable | PollError::Transport(_))) => {
                warn!(submission_id, error = %e, "poll failed transiently, serving stale value");
                self.store
                    .get(submission_id)
                    .await
                    .map_err(|e| RouterError::Internal(e.to_string()))
            }
        }
    }

    async fn apply_remote_status(
        &self,
        submission_id: &str,
        route: &router_drivers::RouteConfig,
        remote_status: RemoteStatus,
        now: DateTime<Utc>,
    ) -> Result<Submission, RouterError> {
        match self.updater.apply(submission_id, &remote_status, now).await {
            Ok(outcome) => {
                let submission = match &outcome {
                    UpdateOutcome::Updated(s) | UpdateOutcome::Unchanged(s) => s,
                };
                self.repopulate_cache(submission, route, now).await;
                Ok(submission.clone())
            }
            Err(UpdateError::NotFound) => Err(RouterError::NotFound),
            Err(UpdateError::Contended(_)) => Err(RouterError::Contended),
            Err(UpdateError::Store(e)) => Err(RouterError::Internal(e.to_string())),
        }
    }

    async fn repopulate_cache(&self, submission: &Submission, route: &router_drivers::RouteConfig, _now: DateTime<Utc>) {
        let ttl = ttl_for(
            submission.is_terminal(),
            route.status_threshold_seconds,
            self.config.terminal_ttl,
            self.config.non_terminal_ttl,
        );
        if let Err(e) = self.cache.put(submission, ttl).await {
            warn!(submission_id = %submission.submission_id, error = %e, "failed to repopulate cache");
        }
    }
}

fn within_threshold(last_updated_at: DateTime<Utc>, now: DateTime<Utc>, threshold_seconds: u64) -> bool {
    let age = now.signed_duration_since(last_updated_at);
    age <= chrono::Duration::seconds(threshold_seconds as i64)
}

fn submit_error_message(e: &SubmitError) -> String {
    e.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use router_db::test_utils::setup_test_pool;
    use router_db::SqliteSubmissionStore;
    use router_drivers::{DriverSelector, EndpointDriver, RemoteStatus, StubDriver};
    use router_utils::route_config::RouteConfigDoc;
    use std::collections::HashMap;

    struct Harness {
        core: Arc<RouterCore>,
        stub: Arc<StubDriver>,
        _tempdir: tempfile::TempDir,
    }

    async fn harness(status_threshold_seconds: u64) -> Harness {
        let (pool, tempdir) = setup_test_pool().await;
        let store: Arc<dyn SubmissionStore> = Arc::new(SqliteSubmissionStore::new(pool));

        let doc: RouteConfigDoc = toml::from_str(&format!(
            r#"
[[route]]
routeId = "R1"
endpointType = "STUB"
endpointUrl = "stub://local"
statusThresholdSeconds = {status_threshold_seconds}
"#
        ))
        .unwrap();
        let registry = Arc::new(RouteRegistry::new(&doc).unwrap());

        let stub = Arc::new(StubDriver::new());
        let mut drivers: HashMap<String, Arc<dyn EndpointDriver>> = HashMap::new();
        drivers.insert("STUB".to_string(), stub.clone());
        let selector = Arc::new(DriverSelector::new(drivers));

        let cache: Arc<dyn ResponseCache> = Arc::new(crate::cache::InMemoryResponseCache::new());

        let core = Arc::new(RouterCore::new(
            registry,
            store,
            selector,
            cache,
            RouterConfig::default(),
        ));

        Harness {
            core,
            stub,
            _tempdir: tempdir,
        }
    }

    fn remote_status(status: Status, reported_at: DateTime<Utc>) -> RemoteStatus {
        RemoteStatus {
            status,
            result: None,
            tasks: Vec::new(),
            reported_at,
        }
    }

    #[tokio::test]
    async fn status_within_threshold_does_not_poll() {
        let h = harness(300).await;
        let now = Utc::now();
        let submission_id = h
            .core
            .submit_workflow("R1", "wf-1", JsonMap::new(), now)
            .await
            .unwrap();

        let fetched = h.core.get_submission_status(&submission_id, now).await.unwrap();
        assert_eq!(fetched.status, Status::Queued);
        assert_eq!(h.stub.poll_call_count(), 0);
    }

    #[tokio::test]
    async fn status_past_threshold_triggers_exactly_one_poll() {
        let h = harness(1).await;
        let now = Utc::now();
        let submission_id = h
            .core
            .submit_workflow("R1", "wf-1", JsonMap::new(), now)
            .await
            .unwrap();

        let later = now + chrono::Duration::seconds(10);
        h.stub
            .push_poll_result(Ok(remote_status(Status::Running, later)))
            .await;
        let fetched = h.core.get_submission_status(&submission_id, later).await.unwrap();
        assert_eq!(fetched.status, Status::Running);
        assert_eq!(h.stub.poll_call_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_stale_status_reads_poll_at_most_once() {
        let h = harness(1).await;
        let now = Utc::now();
        let submission_id = h
            .core
            .submit_workflow("R1", "wf-1", JsonMap::new(), now)
            .await
            .unwrap();

        let later = now + chrono::Duration::seconds(10);
        h.stub
            .push_poll_result(Ok(remote_status(Status::Running, later)))
            .await;

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let core = h.core.clone();
            let id = submission_id.clone();
            tasks.push(tokio::spawn(async move {
                core.get_submission_status(&id, later).await.unwrap()
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }

        assert!(h.stub.poll_call_count() <= 1, "expected at most one pollStatus call, got {}", h.stub.poll_call_count());
    }

    #[tokio::test]
    async fn callback_after_completion_is_a_no_op() {
        let h = harness(300).await;
        let now = Utc::now();
        let submission_id = h
            .core
            .submit_workflow("R1", "wf-1", JsonMap::new(), now)
            .await
            .unwrap();

        let completed_at = now + chrono::Duration::seconds(5);
        let completed = h
            .core
            .refresh_with_status(&submission_id, remote_status(Status::Completed, completed_at), completed_at)
            .await
            .unwrap();
        assert_eq!(completed.status, Status::Completed);
        let version_after_completion = completed.version;

        let later = completed_at + chrono::Duration::seconds(5);
        let after_late_callback = h
            .core
            .refresh_with_status(&submission_id, remote_status(Status::Running, later), later)
            .await
            .unwrap();

        assert_eq!(after_late_callback.status, Status::Completed);
        assert_eq!(after_late_callback.version, version_after_completion);
    }
}
