use std::time::Duration;

use router_utils::env_or_filtered;

/// Router-wide tunables, all environment-overridable. Built once at
/// startup and passed explicitly into every component that needs it — no
/// process-global state.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Default non-terminal cache TTL, capped per-route by `statusThresholdSeconds`.
    pub non_terminal_ttl: Duration,
    /// TTL applied to cached terminal submissions.
    pub terminal_ttl: Duration,
    /// TTL of the exclusive per-submission refresh lease.
    pub refresh_lease_ttl: Duration,
    /// Deadline budget for a single driver call.
    pub driver_call_deadline: Duration,
    /// Deadline budget for a single store call.
    pub store_call_deadline: Duration,
    /// Deadline budget for a single cache call.
    pub cache_call_deadline: Duration,
    /// Status poller tick interval.
    pub poller_interval: Duration,
    /// Maximum submissions refreshed concurrently per poller tick.
    pub poller_concurrency: usize,
    /// Maximum number of entries accepted in a submission's parameter map.
    pub max_parameters: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        RouterConfig {
            non_terminal_ttl: Duration::from_secs(3600),
            terminal_ttl: Duration::from_secs(24 * 3600),
            refresh_lease_ttl: Duration::from_secs(30),
            driver_call_deadline: Duration::from_secs(2),
            store_call_deadline: Duration::from_secs(1),
            cache_call_deadline: Duration::from_millis(500),
            poller_interval: Duration::from_secs(30),
            poller_concurrency: 16,
            max_parameters: 256,
        }
    }
}

impl RouterConfig {
    /// Builds configuration from environment variables, falling back to
    /// the defaults above for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = RouterConfig::default();
        RouterConfig {
            non_terminal_ttl: Duration::from_secs(env_or_filtered(
                "ROUTER_NON_TERMINAL_TTL_SECONDS",
                defaults.non_terminal_ttl.as_secs(),
                |v: &u64| *v > 0,
            )),
            terminal_ttl: Duration::from_secs(env_or_filtered(
                "ROUTER_TERMINAL_TTL_SECONDS",
                defaults.terminal_ttl.as_secs(),
                |v: &u64| *v > 0,
            )),
            refresh_lease_ttl: Duration::from_secs(env_or_filtered(
                "ROUTER_REFRESH_LEASE_TTL_SECONDS",
                defaults.refresh_lease_ttl.as_secs(),
                |v: &u64| *v > 0,
            )),
            driver_call_deadline: Duration::from_millis(env_or_filtered(
                "ROUTER_DRIVER_CALL_DEADLINE_MS",
                defaults.driver_call_deadline.as_millis() as u64,
                |v: &u64| *v > 0,
            )),
            store_call_deadline: Duration::from_millis(env_or_filtered(
                "ROUTER_STORE_CALL_DEADLINE_MS",
                defaults.store_call_deadline.as_millis() as u64,
                |v: &u64| *v > 0,
            )),
            cache_call_deadline: Duration::from_millis(env_or_filtered(
                "ROUTER_CACHE_CALL_DEADLINE_MS",
                defaults.cache_call_deadline.as_millis() as u64,
                |v: &u64| *v > 0,
            )),
            poller_interval: Duration::from_secs(env_or_filtered(
                "ROUTER_POLLER_INTERVAL_SECONDS",
                defaults.poller_interval.as_secs(),
                |v: &u64| *v > 0,
            )),
            poller_concurrency: env_or_filtered(
                "ROUTER_POLLER_CONCURRENCY",
                defaults.poller_concurrency,
                |v: &usize| *v > 0,
            ),
            max_parameters: env_or_filtered(
                "ROUTER_MAX_PARAMETERS",
                defaults.max_parameters,
                |v: &usize| *v > 0,
            ),
        }
    }
}
