use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub mod callback;
pub mod health;
pub mod status;
pub mod submit;

/// Composes the HTTP surface: submit, status (by id and by period),
/// callback, and a liveness check.
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(submit::router())
        .merge(status::router())
        .merge(callback::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
