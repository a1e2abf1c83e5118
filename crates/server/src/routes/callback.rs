use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use chrono::Utc;
use router_core::CallbackSink;
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CallbackQuery {
    #[serde(rename = "routeId")]
    route_id: String,
}

async fn callback(
    State(sink): State<Arc<CallbackSink>>,
    Query(query): Query<CallbackQuery>,
    body: axum::body::Bytes,
) -> Result<StatusCode, ApiError> {
    sink.accept(&query.route_id, &body, Utc::now()).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn router() -> Router<AppState> {
    Router::new().route("/workflows/callback", post(callback))
}
