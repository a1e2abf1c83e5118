use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use router_core::RouterCore;
use router_db::models::{Status, Submission};
use router_db::store::PeriodFilter;
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::AppState;

async fn get_status(
    State(core): State<Arc<RouterCore>>,
    Path(submission_id): Path<String>,
) -> Result<Json<Submission>, ApiError> {
    let submission = core.get_submission_status(&submission_id, Utc::now()).await?;
    Ok(Json(submission))
}

#[derive(Deserialize)]
pub struct PeriodQuery {
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    #[serde(rename = "routeId")]
    route_id: Option<String>,
    #[serde(rename = "workflowId")]
    workflow_id: Option<String>,
    status: Option<String>,
}

async fn get_by_period(
    State(core): State<Arc<RouterCore>>,
    Query(query): Query<PeriodQuery>,
) -> Result<Json<Vec<Submission>>, ApiError> {
    let status = match query.status {
        Some(ref raw) => Some(
            Status::parse(raw)
                .ok_or_else(|| ApiError::bad_request("InvalidParameters", format!("unknown status {raw}")))?,
        ),
        None => None,
    };
    let filter = PeriodFilter {
        route_id: query.route_id,
        workflow_id: query.workflow_id,
        status,
    };
    let submissions = core
        .get_submissions_by_period(query.from, query.to, &filter)
        .await?;
    Ok(Json(submissions))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/workflows/status/{submissionId}", get(get_status))
        .route("/workflows/status", get(get_by_period))
}
