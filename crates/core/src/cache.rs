use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use router_db::models::Submission;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
}

/// Short-lived store keyed by submission id plus a secondary
/// route+status index, and the cross-process refresh lease. Failures here
/// are always treated as a miss by callers (see Failure semantics, §4.7) —
/// `CacheError` exists so call sites can log it, never to propagate to a
/// client.
#[async_trait]
pub trait ResponseCache: Send + Sync {
    async fn get(&self, submission_id: &str) -> Result<Option<Submission>, CacheError>;

    /// Replaces the cache entry for `submission.submission_id` atomically,
    /// writing the `sub:` body once and updating the `idx:` index.
    async fn put(&self, submission: &Submission, ttl: Duration) -> Result<(), CacheError>;

    async fn evict(&self, submission_id: &str) -> Result<(), CacheError>;

    /// Attempts to acquire the exclusive `refresh:{submissionId}` lease.
    /// Returns `Some(token)` on success (the caller must pass `token` back
    /// to `release_lease`); `None` if another caller already holds it.
    async fn try_acquire_lease(
        &self,
        submission_id: &str,
        ttl: Duration,
    ) -> Result<Option<String>, CacheError>;

    /// Releases the lease only if `token` still matches the current
    /// holder (a lease that already expired and was re-acquired by
    /// another caller is left alone).
    async fn release_lease(&self, submission_id: &str, token: &str) -> Result<(), CacheError>;
}

fn sub_key(submission_id: &str) -> String {
    format!("sub:{submission_id}")
}

fn idx_key(route_id: &str, status: &str, submission_id: &str) -> String {
    format!("idx:{route_id}:{status}:{submission_id}")
}

fn lease_key(submission_id: &str) -> String {
    format!("refresh:{submission_id}")
}

struct Entry {
    submission: Submission,
    expires_at: Instant,
}

struct Lease {
    token: String,
    expires_at: Instant,
}

/// Single-process cache backed by `dashmap`, used for tests and for
/// single-instance deployments where a shared Redis is unnecessary.
#[derive(Default)]
pub struct InMemoryResponseCache {
    entries: DashMap<String, Entry>,
    leases: DashMap<String, Lease>,
}

impl InMemoryResponseCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResponseCache for InMemoryResponseCache {
    async fn get(&self, submission_id: &str) -> Result<Option<Submission>, CacheError> {
        let key = sub_key(submission_id);
        match self.entries.get(&key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.submission.clone())),
            Some(_) => {
                drop(self.entries.remove(&key));
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put(&self, submission: &Submission, ttl: Duration) -> Result<(), CacheError> {
        let key = sub_key(&submission.submission_id);
        self.entries.insert(
            key,
            Entry {
                submission: submission.clone(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn evict(&self, submission_id: &str) -> Result<(), CacheError> {
        self.entries.remove(&sub_key(submission_id));
        Ok(())
    }

    async fn try_acquire_lease(
        &self,
        submission_id: &str,
        ttl: Duration,
    ) -> Result<Option<String>, CacheError> {
        let key = lease_key(submission_id);
        let now = Instant::now();
        let mut acquired = None;
        self.leases
            .entry(key)
            .and_modify(|lease| {
                if lease.expires_at <= now {
                    let token = Uuid::new_v4().to_string();
                    lease.token = token.clone();
                    lease.expires_at = now + ttl;
                    acquired = Some(token);
                }
            })
            .or_insert_with(|| {
                let token = Uuid::new_v4().to_string();
                acquired = Some(token.clone());
                Lease {
                    token,
                    expires_at: now + ttl,
                }
            });
        Ok(acquired)
    }

    async fn release_lease(&self, submission_id: &str, token: &str) -> Result<(), CacheError> {
        let key = lease_key(submission_id);
        if let Some(lease) = self.leases.get(&key) {
            if lease.token == token {
                drop(lease);
                self.leases.remove(&key);
            }
        }
        Ok(())
    }
}

/// Redis-backed cache for multi-instance deployments. `sub:`/`idx:` entries
/// carry a TTL; the lease uses `SET NX PX` to acquire and a compare-and-delete
/// Lua script to release only the token's own holder.
pub struct RedisResponseCache {
    manager: redis::aio::ConnectionManager,
}

impl RedisResponseCache {
    pub async fn connect(redis_url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;
        Ok(RedisResponseCache { manager })
    }
}

const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

#[async_trait]
impl ResponseCache for RedisResponseCache {
    async fn get(&self, submission_id: &str) -> Result<Option<Submission>, CacheError> {
        use redis::AsyncCommands;
        let mut conn = self.manager.clone();
        let raw: Option<String> = conn
            .get(sub_key(submission_id))
            .await
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;
        match raw {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| CacheError::Unavailable(e.to_string())),
            None => Ok(None),
        }
    }

    async fn put(&self, submission: &Submission, ttl: Duration) -> Result<(), CacheError> {
        use redis::AsyncCommands;
        let mut conn = self.manager.clone();
        let json = serde_json::to_string(submission)
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;
        let ttl_secs = ttl.as_secs().max(1);
        let key = sub_key(&submission.submission_id);
        let idx = idx_key(
            &submission.route_id,
            submission.status.as_str(),
            &submission.submission_id,
        );
        conn.set_ex::<_, _, ()>(&key, json, ttl_secs)
            .await
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;
        conn.set_ex::<_, _, ()>(&idx, submission.submission_id.clone(), ttl_secs)
            .await
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;
        Ok(())
    }

    async fn evict(&self, submission_id: &str) -> Result<(), CacheError> {
        use redis::AsyncCommands;
        let mut conn = self.manager.clone();
        conn.del::<_, ()>(sub_key(submission_id))
            .await
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;
        Ok(())
    }

    async fn try_acquire_lease(
        &self,
        submission_id: &str,
        ttl: Duration,
    ) -> Result<Option<String>, CacheError> {
        use redis::AsyncCommands;
        let mut conn = self.manager.clone();
        let token = Uuid::new_v4().to_string();
        let ttl_ms = ttl.as_millis().max(1) as u64;
        let acquired: bool = conn
            .set_options(
                lease_key(submission_id),
                token.clone(),
                redis::SetOptions::default()
                    .conditional_set(redis::ExistenceCheck::NX)
                    .with_expiration(redis::SetExpiry::PX(ttl_ms)),
            )
            .await
            .map(|v: Option<String>| v.is_some())
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;
        Ok(if acquired { Some(token) } else { None })
    }

    async fn release_lease(&self, submission_id: &str, token: &str) -> Result<(), CacheError> {
        let mut conn = self.manager.clone();
        let script = redis::Script::new(RELEASE_SCRIPT);
        script
            .key(lease_key(submission_id))
            .arg(token)
            .invoke_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;
        Ok(())
    }
}

/// Computes the non-terminal TTL for a submission: the lesser of the
/// route's `statusThresholdSeconds` and the router-wide non-terminal TTL
/// default. Terminal submissions use the long-lived terminal TTL instead.
pub fn ttl_for(
    is_terminal: bool,
    route_threshold_seconds: u64,
    terminal_ttl: Duration,
    non_terminal_ttl_default: Duration,
) -> Duration {
    if is_terminal {
        terminal_ttl
    } else {
        std::cmp::min(
            Duration::from_secs(route_threshold_seconds),
            non_terminal_ttl_default,
        )
    }
}

pub type SharedResponseCache = Arc<dyn ResponseCache>;
