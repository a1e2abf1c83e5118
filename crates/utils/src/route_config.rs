use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

/// Raw, as-parsed representation of one route entry in the configuration
/// document. `router-core`'s Route Registry turns these into validated
/// `RouteConfig` values (duplicate-id and endpoint-type checks live there,
/// since that is registry behaviour, not document parsing).
#[derive(Debug, Clone, Deserialize)]
pub struct RouteConfigSource {
    #[serde(rename = "routeId")]
    pub route_id: String,
    #[serde(rename = "endpointType")]
    pub endpoint_type: String,
    #[serde(rename = "endpointUrl")]
    pub endpoint_url: String,
    #[serde(rename = "userId", default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub properties: toml::value::Table,
    #[serde(rename = "statusThresholdSeconds", default = "default_threshold")]
    pub status_threshold_seconds: u64,
}

fn default_threshold() -> u64 {
    300
}

/// Top-level shape of the route configuration document: one `[[route]]`
/// table per route.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RouteConfigDoc {
    #[serde(default, rename = "route")]
    pub routes: Vec<RouteConfigSource>,
}

#[derive(Debug, Error)]
pub enum RouteConfigError {
    #[error("failed to read route configuration file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse route configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads and parses the route configuration document at `path`.
///
/// Returns the raw parsed entries; callers are responsible for the
/// validation rules (duplicate `routeId`, recognised `endpointType`) that
/// the registry applies on top of this.
pub fn load_route_config_doc(path: &Path) -> Result<RouteConfigDoc, RouteConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| RouteConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let doc: RouteConfigDoc = toml::from_str(&raw)?;
    Ok(doc)
}
