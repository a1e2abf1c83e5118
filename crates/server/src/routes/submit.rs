use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use router_core::RouterCore;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct SubmitQuery {
    #[serde(rename = "routeId")]
    route_id: String,
    #[serde(rename = "workflowId")]
    workflow_id: String,
}

#[derive(Serialize)]
pub struct SubmitResponse {
    #[serde(rename = "submissionId")]
    submission_id: String,
}

async fn submit(
    State(core): State<Arc<RouterCore>>,
    Query(query): Query<SubmitQuery>,
    Json(parameters): Json<JsonMap<String, Value>>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let submission_id = core
        .submit_workflow(&query.route_id, &query.workflow_id, parameters, Utc::now())
        .await?;
    Ok(Json(SubmitResponse { submission_id }))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/workflows/submit", post(submit))
}
