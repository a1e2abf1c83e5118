use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use router_db::models::Status;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value};

use crate::driver::{authenticate_callback, EndpointDriver};
use crate::error::{InvalidCallback, PollError, SubmitError};
use crate::types::{RemoteStatus, RemoteTask, RouteConfig};

#[derive(Debug, Serialize)]
struct SoapParameter {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "$value")]
    value: String,
}

#[derive(Debug, Serialize)]
struct SoapSubmitRequest {
    #[serde(rename = "WorkflowId")]
    workflow_id: String,
    #[serde(rename = "Parameter", default)]
    parameters: Vec<SoapParameter>,
}

#[derive(Debug, Deserialize)]
struct SoapSubmitResponse {
    #[serde(rename = "ExternalId")]
    external_id: String,
}

#[derive(Debug, Deserialize)]
struct SoapTaskPayload {
    #[serde(rename = "TaskId")]
    task_id: String,
    #[serde(rename = "ExternalTaskId", default)]
    external_task_id: Option<String>,
    #[serde(rename = "Status")]
    status: String,
    #[serde(rename = "StartedAt", default)]
    started_at: Option<DateTime<Utc>>,
    #[serde(rename = "EndedAt", default)]
    ended_at: Option<DateTime<Utc>>,
    #[serde(rename = "OrderIndex", default)]
    order_index: i64,
}

#[derive(Debug, Deserialize, Default)]
struct SoapTaskList {
    #[serde(rename = "Task", default)]
    task: Vec<SoapTaskPayload>,
}

#[derive(Debug, Deserialize)]
struct SoapProperty {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "$value")]
    value: String,
}

#[derive(Debug, Deserialize, Default)]
struct SoapResultProperties {
    #[serde(rename = "Property", default)]
    property: Vec<SoapProperty>,
}

#[derive(Debug, Deserialize)]
struct SoapPollResult {
    #[serde(rename = "Status")]
    status: String,
    #[serde(rename = "ReportedAt")]
    reported_at: DateTime<Utc>,
    #[serde(rename = "Tasks", default)]
    tasks: SoapTaskList,
    #[serde(rename = "ResultProperties", default)]
    result_properties: SoapResultProperties,
    #[serde(rename = "SubmissionId", default)]
    submission_id: Option<String>,
    #[serde(rename = "CallbackSecret", default)]
    callback_secret: Option<String>,
}

impl SoapPollResult {
    fn into_remote_status(self, translate: impl Fn(&str) -> Status) -> RemoteStatus {
        let mut result = JsonMap::new();
        for prop in self.result_properties.property {
            result.insert(prop.name, Value::String(prop.value));
        }
        RemoteStatus {
            status: translate(&self.status),
            result: if result.is_empty() { None } else { Some(result) },
            tasks: self
                .tasks
                .task
                .into_iter()
                .map(|t| RemoteTask {
                    task_id: t.task_id,
                    external_task_id: t.external_task_id,
                    status: translate(&t.status),
                    started_at: t.started_at,
                    ended_at: t.ended_at,
                    order_index: t.order_index,
                })
                .collect(),
            reported_at: self.reported_at,
        }
    }
}

/// Drives a SOAP-based control center: XML envelopes, basic-auth
/// credentials, and a per-route status translation table (since SOAP
/// endpoints of this shape report their own status vocabulary rather than
/// the router's enum directly).
pub struct SoapDriver {
    client: Client,
}

impl Default for SoapDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl SoapDriver {
    pub fn new() -> Self {
        SoapDriver {
            client: Client::new(),
        }
    }

    fn status_translator(route: &RouteConfig) -> impl Fn(&str) -> Status + '_ {
        move |raw: &str| {
            if let Some(Value::Object(map)) = route.properties.get("statusMap") {
                if let Some(Value::String(token)) = map.get(raw) {
                    if let Some(status) = Status::parse(token) {
                        return status;
                    }
                }
            }
            Status::parse(raw).unwrap_or(Status::Running)
        }
    }
}

#[async_trait]
impl EndpointDriver for SoapDriver {
    async fn submit(
        &self,
        route: &RouteConfig,
        workflow_id: &str,
        parameters: &JsonMap<String, Value>,
    ) -> Result<String, SubmitError> {
        let body = SoapSubmitRequest {
            workflow_id: workflow_id.to_string(),
            parameters: parameters
                .iter()
                .map(|(k, v)| SoapParameter {
                    name: k.clone(),
                    value: value_to_string(v),
                })
                .collect(),
        };
        let xml = serde_xml_rs::to_string(&body)
            .map_err(|e| SubmitError::Transport(format!("failed to encode envelope: {e}")))?;

        let mut request = self.client.post(&route.endpoint_url).body(xml);
        if let Some(user) = &route.credentials.user {
            request = request.basic_auth(user, route.credentials.secret.clone());
        }

        let response = request
            .send()
            .await
            .map_err(|e| SubmitError::Transport(e.to_string()))?;

        match response.status() {
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
                Err(SubmitError::AuthError)
            }
            status if status.is_server_error() => Err(SubmitError::Unavailable),
            status if status.is_success() => {
                let body = response
                    .text()
                    .await
                    .map_err(|e| SubmitError::Transport(e.to_string()))?;
                let parsed: SoapSubmitResponse = serde_xml_rs::from_str(&body)
                    .map_err(|e| SubmitError::Rejected(format!("malformed response: {e}")))?;
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
        let url = format!("{}?externalId={}", route.endpoint_url, external_id);
        let mut request = self.client.get(&url);
        if let Some(user) = &route.credentials.user {
            request = request.basic_auth(user, route.credentials.secret.clone());
        }
        let response = request
            .send()
            .await
            .map_err(|e| PollError::Transport(e.to_string()))?;

        match response.status() {
            reqwest::StatusCode::NOT_FOUND => Err(PollError::NotFound),
            status if status.is_server_error() => Err(PollError::Unavailable),
            status if status.is_success() => {
                let body = response
                    .text()
                    .await
                    .map_err(|e| PollError::Transport(e.to_string()))?;
                let parsed: SoapPollResult = serde_xml_rs::from_str(&body)
                    .map_err(|e| PollError::Transport(format!("malformed response: {e}")))?;
                Ok(parsed.into_remote_status(Self::status_translator(route)))
            }
            status => Err(PollError::Transport(format!("unexpected status {status}"))),
        }
    }

    async fn verify_callback(
        &self,
        route: &RouteConfig,
        payload: &[u8],
    ) -> Result<(String, RemoteStatus), InvalidCallback> {
        let body = std::str::from_utf8(payload)
            .map_err(|e| InvalidCallback(format!("non-utf8 callback payload: {e}")))?;
        let parsed: SoapPollResult = serde_xml_rs::from_str(body)
            .map_err(|e| InvalidCallback(format!("malformed callback envelope: {e}")))?;
        authenticate_callback(route, parsed.callback_secret.as_deref())?;
        let submission_id = parsed
            .submission_id
            .clone()
            .ok_or_else(|| InvalidCallback("callback envelope missing SubmissionId".to_string()))?;
        Ok((submission_id, parsed.into_remote_status(Self::status_translator(route))))
    }

    fn kind(&self) -> &'static str {
        "SOAP"
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
