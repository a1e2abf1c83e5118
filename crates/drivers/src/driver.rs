use async_trait::async_trait;
use serde_json::{Map as JsonMap, Value};

use crate::error::{InvalidCallback, PollError, SubmitError};
use crate::types::{RemoteStatus, RouteConfig};

/// Uniform contract hiding SOAP/REST/messaging transport differences
/// behind submit/poll/callback operations. Implementations must be
/// stateless with respect to individual submissions — any per-submission
/// state lives in the Submission Store, not in the driver.
#[async_trait]
pub trait EndpointDriver: Send + Sync {
    async fn submit(
        &self,
        route: &RouteConfig,
        workflow_id: &str,
        parameters: &JsonMap<String, Value>,
    ) -> Result<String, SubmitError>;

    async fn poll_status(
        &self,
        route: &RouteConfig,
        external_id: &str,
    ) -> Result<RemoteStatus, PollError>;

    /// Authenticates and parses an inbound callback payload. Returns the
    /// `submissionId` the endpoint correlated the callback to (echoed back
    /// from the value the router supplied at submit time) alongside the
    /// parsed status.
    async fn verify_callback(
        &self,
        route: &RouteConfig,
        payload: &[u8],
    ) -> Result<(String, RemoteStatus), InvalidCallback>;

    fn kind(&self) -> &'static str;
}

/// Shared-secret check used by `verify_callback` implementations: the
/// route's configured secret, if any, must match the secret the callback
/// payload presented. A route with no configured secret accepts any
/// callback (no credentials to check against).
pub fn authenticate_callback(route: &RouteConfig, presented: Option<&str>) -> Result<(), InvalidCallback> {
    match &route.credentials.secret {
        Some(expected) if presented == Some(expected.as_str()) => Ok(()),
        Some(_) => Err(InvalidCallback("callback secret mismatch".to_string())),
        None => Ok(()),
    }
}
