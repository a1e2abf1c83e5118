use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use router_db::models::Status;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value};

use crate::driver::{authenticate_callback, EndpointDriver};
use crate::error::{InvalidCallback, PollError, SubmitError};
use crate::types::{RemoteStatus, RemoteTask, RouteConfig};

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    #[serde(rename = "workflowId")]
    workflow_id: &'a str,
    parameters: &'a JsonMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(rename = "externalId")]
    external_id: String,
}

#[derive(Debug, Deserialize)]
struct RestTaskPayload {
    #[serde(rename = "taskId")]
    task_id: String,
    #[serde(rename = "externalTaskId", default)]
    external_task_id: Option<String>,
    status: String,
    #[serde(rename = "startedAt", default)]
    started_at: Option<DateTime<Utc>>,
    #[serde(rename = "endedAt", default)]
    ended_at: Option<DateTime<Utc>>,
    #[serde(rename = "orderIndex", default)]
    order_index: i64,
}

#[derive(Debug, Deserialize)]
struct RestStatusPayload {
    status: String,
    #[serde(default)]
    result: Option<JsonMap<String, Value>>,
    #[serde(default)]
    tasks: Vec<RestTaskPayload>,
    #[serde(rename = "reportedAt")]
    reported_at: DateTime<Utc>,
    #[serde(rename = "submissionId", default)]
    submission_id: Option<String>,
    #[serde(rename = "callbackSecret", default)]
    callback_secret: Option<String>,
}

impl RestStatusPayload {
    fn into_remote_status(self) -> RemoteStatus {
        RemoteStatus {
            status: Status::parse(&self.status).unwrap_or(Status::Running),
            result: self.result,
            tasks: self
                .tasks
                .into_iter()
                .map(|t| RemoteTask {
                    task_id: t.task_id,
                    external_task_id: t.external_task_id,
                    status: Status::parse(&t.status).unwrap_or(Status::Running),
                    started_at: t.started_at,
                    ended_at: t.ended_at,
                    order_index: t.order_index,
                })
                .collect(),
            reported_at: self.reported_at,
        }
    }
}

/// Drives a REST-based orchestrator: JSON request/response bodies, status
/// codes mapped onto the uniform driver error kinds per the endpoint
/// contract.
pub struct RestDriver {
    client: Client,
}

impl Default for RestDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl RestDriver {
    pub fn new() -> Self {
        RestDriver {
            client: Client::new(),
        }
    }

    fn authed(&self, route: &RouteConfig, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match (&route.credentials.user, &route.credentials.secret) {
            (Some(user), secret) => builder.basic_auth(user, secret.clone()),
            _ => builder,
        }
    }
}

#[async_trait]
impl EndpointDriver for RestDriver {
    async fn submit(
        &self,
        route: &RouteConfig,
        workflow_id: &str,
        parameters: &JsonMap<String, Value>,
    ) -> Result<String, SubmitError> {
        let url = format!("{}/workflows", route.endpoint_url.trim_end_matches('/'));
        let body = SubmitRequest {
            workflow_id,
            parameters,
        };
        let request = self.authed(route, self.client.post(&url).json(&body));
        let response = request
            .send()
            .await
            .map_err(|e| SubmitError::Transport(e.to_string()))?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(SubmitError::AuthError),
            status if status.is_server_error() => Err(SubmitError::Unavailable),
            status if status.is_success() => {
                let parsed: SubmitResponse = response
                    .json()
                    .await
                    .map_err(|e| SubmitError::Transport(e.to_string()))?;
                Ok(parsed.external_id)
            }
            status => Err(SubmitError::Rejected(format!("unexpected status {status}"))),
        }
    }

    async fn poll_status(
        &self,
        route: &RouteConfig,
        external_id: &str,
    ) -> Result<RemoteStatus, PollError> {
        let url = format!(
            "{}/workflows/{}/status",
            route.endpoint_url.trim_end_matches('/'),
            external_id
        );
        let request = self.authed(route, self.client.get(&url));
        let response = request
            .send()
            .await
            .map_err(|e| PollError::Transport(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(PollError::NotFound),
            status if status.is_server_error() => Err(PollError::Unavailable),
            status if status.is_success() => {
                let payload: RestStatusPayload = response
                    .json()
                    .await
                    .map_err(|e| PollError::Transport(e.to_string()))?;
                Ok(payload.into_remote_status())
            }
            status => Err(PollError::Transport(format!("unexpected status {status}"))),
        }
    }

    async fn verify_callback(
        &self,
        route: &RouteConfig,
        payload: &[u8],
    ) -> Result<(String, RemoteStatus), InvalidCallback> {
        let parsed: RestStatusPayload = serde_json::from_slice(payload)
            .map_err(|e| InvalidCallback(format!("malformed callback payload: {e}")))?;
        authenticate_callback(route, parsed.callback_secret.as_deref())?;
        let submission_id = parsed
            .submission_id
            .clone()
            .ok_or_else(|| InvalidCallback("callback payload missing submissionId".to_string()))?;
        Ok((submission_id, parsed.into_remote_status()))
    }

    fn kind(&self) -> &'static str {
        "REST"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Credentials;
    use chrono::Utc;

    fn route(secret: Option<&str>) -> RouteConfig {
        RouteConfig {
            route_id: "r1".to_string(),
            endpoint_type: "REST".to_string(),
            endpoint_url: "http://example.invalid".to_string(),
            credentials: Credentials {
                user: None,
                secret: secret.map(str::to_string),
            },
            properties: JsonMap::new(),
            status_threshold_seconds: 60,
        }
    }

    fn payload(submission_id: &str, callback_secret: Option<&str>) -> Vec<u8> {
        let mut body = serde_json::json!({
            "status": "COMPLETED",
            "reportedAt": Utc::now(),
            "submissionId": submission_id,
        });
        if let Some(secret) = callback_secret {
            body["callbackSecret"] = Value::String(secret.to_string());
        }
        serde_json::to_vec(&body).unwrap()
    }

    #[tokio::test]
    async fn verify_callback_accepts_matching_secret() {
        let driver = RestDriver::new();
        let route = route(Some("shh"));
        let (submission_id, _) = driver
            .verify_callback(&route, &payload("sub-1", Some("shh")))
            .await
            .unwrap();
        assert_eq!(submission_id, "sub-1");
    }

    #[tokio::test]
    async fn verify_callback_accepts_any_secret_when_route_has_none_configured() {
        let driver = RestDriver::new();
        let route = route(None);
        let result = driver
            .verify_callback(&route, &payload("sub-1", None))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn verify_callback_rejects_mismatched_secret() {
        let driver = RestDriver::new();
        let route = route(Some("shh"));
        let result = driver
            .verify_callback(&route, &payload("sub-1", Some("wrong")))
            .await;
        assert!(matches!(result, Err(InvalidCallback(_))));
    }

    #[tokio::test]
    async fn verify_callback_rejects_missing_secret() {
        let driver = RestDriver::new();
        let route = route(Some("shh"));
        let result = driver
            .verify_callback(&route, &payload("sub-1", None))
            .await;
        assert!(result.is_err());
    }
}
