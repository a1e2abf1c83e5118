use std::sync::Arc;

use chrono::{DateTime, Utc};
use router_db::models::Submission;

use crate::error::RouterError;
use crate::router_core::RouterCore;

/// Endpoint-initiated updates. Delegates straight into `RouterCore`'s
/// refresh path under the same per-submission lease the poller uses, so a
/// callback racing a poll tick cannot double-apply a diff.
pub struct CallbackSink {
    core: Arc<RouterCore>,
}

impl CallbackSink {
    pub fn new(core: Arc<RouterCore>) -> Self {
        CallbackSink { core }
    }

    pub async fn accept(
        &self,
        route_id: &str,
        payload: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Submission, RouterError> {
        self.core.handle_callback(route_id, payload, now).await
    }
}
