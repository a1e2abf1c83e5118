use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use router_drivers::{Credentials, RouteConfig};
use router_utils::route_config::{RouteConfigDoc, RouteConfigSource};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RouteRegistryError {
    #[error("unknown route: {0}")]
    NotFound(String),
    #[error("invalid route configuration: {0}")]
    InvalidConfig(String),
}

/// Loads and indexes route configurations by `routeId`. The snapshot is
/// swapped atomically on reload: readers always see a complete pre- or
/// post-reload map, never a mixture.
pub struct RouteRegistry {
    snapshot: ArcSwap<HashMap<String, RouteConfig>>,
}

impl RouteRegistry {
    pub fn new(doc: &RouteConfigDoc) -> Result<Self, RouteRegistryError> {
        let map = build_snapshot(doc)?;
        Ok(RouteRegistry {
            snapshot: ArcSwap::from_pointee(map),
        })
    }

    pub fn lookup(&self, route_id: &str) -> Result<RouteConfig, RouteRegistryError> {
        self.snapshot
            .load()
            .get(route_id)
            .cloned()
            .ok_or_else(|| RouteRegistryError::NotFound(route_id.to_string()))
    }

    /// Replaces the full route set atomically. On failure the prior
    /// snapshot is retained untouched.
    pub fn reload(&self, doc: &RouteConfigDoc) -> Result<(), RouteRegistryError> {
        let map = build_snapshot(doc)?;
        self.snapshot.store(Arc::new(map));
        Ok(())
    }

    pub fn all(&self) -> Vec<RouteConfig> {
        self.snapshot.load().values().cloned().collect()
    }
}

fn build_snapshot(doc: &RouteConfigDoc) -> Result<HashMap<String, RouteConfig>, RouteRegistryError> {
    let mut map = HashMap::with_capacity(doc.routes.len());
    for source in &doc.routes {
        if map.contains_key(&source.route_id) {
            return Err(RouteRegistryError::InvalidConfig(format!(
                "duplicate routeId {}",
                source.route_id
            )));
        }
        map.insert(source.route_id.clone(), source_to_route_config(source));
    }
    Ok(map)
}

fn source_to_route_config(source: &RouteConfigSource) -> RouteConfig {
    RouteConfig {
        route_id: source.route_id.clone(),
        endpoint_type: source.endpoint_type.clone(),
        endpoint_url: source.endpoint_url.clone(),
        credentials: Credentials {
            user: source.user_id.clone(),
            secret: source.password.clone(),
        },
        properties: toml_table_to_json(&source.properties),
        status_threshold_seconds: source.status_threshold_seconds,
    }
}

fn toml_table_to_json(table: &toml::value::Table) -> serde_json::Map<String, serde_json::Value> {
    table
        .iter()
        .map(|(k, v)| (k.clone(), toml_value_to_json(v)))
        .collect()
}

fn toml_value_to_json(value: &toml::Value) -> serde_json::Value {
    match value {
        toml::Value::String(s) => serde_json::Value::String(s.clone()),
        toml::Value::Integer(i) => serde_json::Value::Number((*i).into()),
        toml::Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        toml::Value::Boolean(b) => serde_json::Value::Bool(*b),
        toml::Value::Datetime(dt) => serde_json::Value::String(dt.to_string()),
        toml::Value::Array(arr) => {
            serde_json::Value::Array(arr.iter().map(toml_value_to_json).collect())
        }
        toml::Value::Table(t) => serde_json::Value::Object(toml_table_to_json(t)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc_with(routes: Vec<RouteConfigSource>) -> RouteConfigDoc {
        RouteConfigDoc { routes }
    }

    fn route_source(id: &str) -> RouteConfigSource {
        RouteConfigSource {
            route_id: id.to_string(),
            endpoint_type: "REST".to_string(),
            endpoint_url: "https://example.test".to_string(),
            user_id: None,
            password: None,
            properties: toml::value::Table::new(),
            status_threshold_seconds: 300,
        }
    }

    #[test]
    fn lookup_returns_not_found_for_unknown_route() {
        let registry = RouteRegistry::new(&doc_with(vec![])).unwrap();
        assert!(matches!(
            registry.lookup("missing"),
            Err(RouteRegistryError::NotFound(_))
        ));
    }

    #[test]
    fn reload_rejects_duplicate_route_ids_and_keeps_prior_snapshot() {
        let registry = RouteRegistry::new(&doc_with(vec![route_source("R1")])).unwrap();
        let bad_reload = registry.reload(&doc_with(vec![route_source("R1"), route_source("R1")]));
        assert!(bad_reload.is_err());
        assert!(registry.lookup("R1").is_ok());
    }

    #[test]
    fn reload_replaces_snapshot_atomically() {
        let registry = RouteRegistry::new(&doc_with(vec![route_source("R1")])).unwrap();
        registry.reload(&doc_with(vec![route_source("R2")])).unwrap();
        assert!(registry.lookup("R1").is_err());
        assert!(registry.lookup("R2").is_ok());
    }
}
