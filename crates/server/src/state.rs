use std::sync::Arc;

use axum::extract::FromRef;
use router_core::{CallbackSink, RouterCore};

/// Shared application state. Each handler extracts only the component it
/// needs via `FromRef` instead of threading one god struct through every
/// extractor.
#[derive(Clone)]
pub struct AppState {
    pub core: Arc<RouterCore>,
    pub callback_sink: Arc<CallbackSink>,
}

impl FromRef<AppState> for Arc<RouterCore> {
    fn from_ref(state: &AppState) -> Self {
        state.core.clone()
    }
}

impl FromRef<AppState> for Arc<CallbackSink> {
    fn from_ref(state: &AppState) -> Self {
        state.callback_sink.clone()
    }
}
