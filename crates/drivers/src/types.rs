use chrono::{DateTime, Utc};
use serde_json::{Map as JsonMap, Value};

/// Basic-auth style credentials carried by a route.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub user: Option<String>,
    pub secret: Option<String>,
}

/// Immutable configuration for one route, as held by the Route Registry and
/// passed to drivers on every call.
#[derive(Debug, Clone)]
pub struct RouteConfig {
    pub route_id: String,
    pub endpoint_type: String,
    pub endpoint_url: String,
    pub credentials: Credentials,
    pub properties: JsonMap<String, Value>,
    pub status_threshold_seconds: u64,
}

/// One child task as reported by an endpoint, prior to being matched
/// against stored tasks by the change detector.
#[derive(Debug, Clone)]
pub struct RemoteTask {
    pub task_id: String,
    pub external_task_id: Option<String>,
    pub status: router_db::models::Status,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub order_index: i64,
}

/// The uniform shape every driver reports back, regardless of wire
/// protocol: a poll result or a parsed callback payload.
#[derive(Debug, Clone)]
pub struct RemoteStatus {
    pub status: router_db::models::Status,
    pub result: Option<JsonMap<String, Value>>,
    pub tasks: Vec<RemoteTask>,
    pub reported_at: DateTime<Utc>,
}
