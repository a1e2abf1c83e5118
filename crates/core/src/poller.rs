use std::sync::Arc;

use chrono::Utc;
use router_db::models::Status;
use router_db::store::SubmissionStore;
use router_drivers::DriverSelector;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::registry::RouteRegistry;
use crate::router_core::RouterCore;

/// Periodic scan of in-flight submissions: wakes stale non-terminal
/// submissions through the same refresh path used by on-demand queries
/// and callbacks, and recovers submissions stuck in SUBMITTED with no
/// `externalId`.
pub struct StatusPoller {
    core: Arc<RouterCore>,
    store: Arc<dyn SubmissionStore>,
    registry: Arc<RouteRegistry>,
    selector: Arc<DriverSelector>,
    concurrency: usize,
}

impl StatusPoller {
    pub fn new(
        core: Arc<RouterCore>,
        store: Arc<dyn SubmissionStore>,
        registry: Arc<RouteRegistry>,
        selector: Arc<DriverSelector>,
        concurrency: usize,
    ) -> Self {
        StatusPoller {
            core,
            store,
            registry,
            selector,
            concurrency,
        }
    }

    /// Runs ticks on `interval` until `shutdown` resolves. In-flight
    /// refreshes from the last tick are allowed to finish; no new tick
    /// starts after shutdown is signalled.
    pub async fn run(&self, interval: std::time::Duration, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick(Utc::now()).await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("status poller shutting down");
                        break;
                    }
                }
            }
        }
    }

    pub async fn tick(&self, now: chrono::DateTime<Utc>) {
        let candidates = match self.store.list_non_terminal().await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "poller failed to list non-terminal submissions");
                return;
            }
        };

        let mut scanned = 0usize;
        let mut refreshed = 0usize;
        let mut stuck_recovered = 0usize;

        let semaphore = Arc::new(Semaphore::new(self.concurrency.max(1)));
        let mut join_set = JoinSet::new();

        for submission in candidates {
            scanned += 1;

            let threshold = self
                .registry
                .lookup(&submission.route_id)
                .map(|r| r.status_threshold_seconds)
                .unwrap_or(300);
            let age = now.signed_duration_since(submission.last_updated_at);
            let is_stale = age > chrono::Duration::seconds(threshold as i64);

            if submission.status == Status::Submitted && submission.external_id.is_none() {
                stuck_recovered += 1;
                self.recover_stuck_submit(submission, now).await;
                continue;
            }

            if !is_stale {
                continue;
            }

            refreshed += 1;
            let core = self.core.clone();
            let permit = semaphore.clone().acquire_owned().await.expect("semaphore not closed");
            join_set.spawn(async move {
                let _permit = permit;
                let submission_id = submission.submission_id.clone();
                if let Err(e) = core.refresh_stale(&submission_id, now).await {
                    warn!(submission_id, error = %e, "poller refresh failed");
                }
            });
        }

        while join_set.join_next().await.is_some() {}

        debug!(
            scanned,
            refreshed,
            stuck_recovered,
            "status poller tick complete"
        );
    }

    async fn recover_stuck_submit(&self, submission: router_db::models::Submission, now: chrono::DateTime<Utc>) {
        let Ok(route) = self.registry.lookup(&submission.route_id) else {
            warn!(submission_id = %submission.submission_id, "cannot recover stuck submission: unknown route");
            return;
        };
        let Ok(driver) = self.selector.resolve(&route.endpoint_type) else {
            warn!(submission_id = %submission.submission_id, "cannot recover stuck submission: unknown endpoint type");
            return;
        };

        let retry = driver
            .submit(&route, &submission.workflow_id, &submission.parameters)
            .await;

        use router_db::models::{SubmissionDiff, SubmissionFieldChanges};
        let diff = match retry {
            Ok(external_id) => SubmissionDiff {
                root: SubmissionFieldChanges {
                    status: Some(Status::Queued),
                    external_id: Some(external_id),
                    ..Default::default()
                },
                ..Default::default()
            },
            Err(e) => SubmissionDiff {
                root: SubmissionFieldChanges {
                    status: Some(Status::Failed),
                    error_message: Some(Some(e.to_string())),
                    ..Default::default()
                },
                ..Default::default()
            },
        };

        if let Err(e) = self
            .store
            .apply_diff(&submission.submission_id, submission.version, &diff, now)
            .await
        {
            warn!(submission_id = %submission.submission_id, error = %e, "failed to record stuck-submit recovery");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{InMemoryResponseCache, ResponseCache};
    use crate::config::RouterConfig;
    use router_db::models::{Submission, SubmissionDiff, SubmissionFieldChanges};
    use router_db::test_utils::setup_test_pool;
    use router_db::SqliteSubmissionStore;
    use router_drivers::{EndpointDriver, RemoteStatus, StubDriver};
    use router_utils::route_config::RouteConfigDoc;
    use serde_json::Map as JsonMap;
    use std::collections::HashMap;

    struct Harness {
        poller: StatusPoller,
        stub: Arc<StubDriver>,
        store: Arc<dyn SubmissionStore>,
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

        let cache: Arc<dyn ResponseCache> = Arc::new(InMemoryResponseCache::new());
        let core = Arc::new(RouterCore::new(
            registry.clone(),
            store.clone(),
            selector.clone(),
            cache,
            RouterConfig::default(),
        ));

        let poller = StatusPoller::new(core, store.clone(), registry, selector, 4);
        Harness {
            poller,
            stub,
            store,
            _tempdir: tempdir,
        }
    }

    fn submission(id: &str, submitted_at: chrono::DateTime<Utc>) -> Submission {
        Submission::new(id.to_string(), "R1".to_string(), "W".to_string(), JsonMap::new(), submitted_at)
    }

    #[tokio::test]
    async fn tick_recovers_a_submission_stuck_without_an_external_id() {
        let h = harness(300).await;
        let now = Utc::now();
        h.store.create(&submission("s1", now)).await.unwrap();
        h.stub.push_submit_result(Ok("X-1".to_string())).await;

        h.poller.tick(now).await;

        let updated = h.store.get("s1").await.unwrap();
        assert_eq!(updated.status, Status::Queued);
        assert_eq!(updated.external_id.as_deref(), Some("X-1"));
        assert_eq!(h.stub.submit_call_count(), 1);
    }

    #[tokio::test]
    async fn tick_refreshes_a_stale_non_terminal_submission() {
        let h = harness(1).await;
        let now = Utc::now();
        let diff = SubmissionDiff {
            root: SubmissionFieldChanges {
                status: Some(Status::Queued),
                external_id: Some("X-1".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        h.store.create(&submission("s1", now)).await.unwrap();
        h.store.apply_diff("s1", 1, &diff, now).await.unwrap();

        let later = now + chrono::Duration::seconds(10);
        h.stub
            .push_poll_result(Ok(RemoteStatus {
                status: Status::Running,
                result: None,
                tasks: Vec::new(),
                reported_at: later,
            }))
            .await;

        h.poller.tick(later).await;

        let updated = h.store.get("s1").await.unwrap();
        assert_eq!(updated.status, Status::Running);
        assert_eq!(h.stub.poll_call_count(), 1);
    }

    #[tokio::test]
    async fn tick_skips_a_fresh_non_terminal_submission() {
        let h = harness(300).await;
        let now = Utc::now();
        let diff = SubmissionDiff {
            root: SubmissionFieldChanges {
                status: Some(Status::Queued),
                external_id: Some("X-1".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        h.store.create(&submission("s1", now)).await.unwrap();
        h.store.apply_diff("s1", 1, &diff, now).await.unwrap();

        h.poller.tick(now).await;

        assert_eq!(h.stub.poll_call_count(), 0);
        assert_eq!(h.stub.submit_call_count(), 0);
    }
}
