use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::{Map as JsonMap, Value};
use tokio::sync::Mutex;

use crate::driver::EndpointDriver;
use crate::error::{InvalidCallback, PollError, SubmitError};
use crate::types::{RemoteStatus, RouteConfig};

/// In-process driver that returns synthetic ids and scripted poll results
/// instead of contacting any real endpoint. Real protocol details for SOAP
/// and REST endpoints are vendor-specific and out of scope; this is the
/// only driver the router's own test suite depends on.
pub struct StubDriver {
    submit_responses: Mutex<VecDeque<Result<String, SubmitError>>>,
    poll_responses: Mutex<VecDeque<Result<RemoteStatus, PollError>>>,
    poll_calls: AtomicUsize,
    submit_calls: AtomicUsize,
}

impl Default for StubDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl StubDriver {
    pub fn new() -> Self {
        StubDriver {
            submit_responses: Mutex::new(VecDeque::new()),
            poll_responses: Mutex::new(VecDeque::new()),
            poll_calls: AtomicUsize::new(0),
            submit_calls: AtomicUsize::new(0),
        }
    }

    /// Queues the result for the next `submit` call; unqueued calls
    /// default to a fresh externalId of the form `X-<n>`.
    pub async fn push_submit_result(&self, result: Result<String, SubmitError>) {
        self.submit_responses.lock().await.push_back(result);
    }

    /// Queues the result for the next `poll_status`/`verify_callback` call.
    pub async fn push_poll_result(&self, result: Result<RemoteStatus, PollError>) {
        self.poll_responses.lock().await.push_back(result);
    }

    pub fn poll_call_count(&self) -> usize {
        self.poll_calls.load(Ordering::SeqCst)
    }

    pub fn submit_call_count(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EndpointDriver for StubDriver {
    async fn submit(
        &self,
        _route: &RouteConfig,
        _workflow_id: &str,
        _parameters: &JsonMap<String, Value>,
    ) -> Result<String, SubmitError> {
        let n = self.submit_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let queued = self.submit_responses.lock().await.pop_front();
        queued.unwrap_or_else(|| Ok(format!("X-{n}")))
    }

    async fn poll_status(
        &self,
        _route: &RouteConfig,
        _external_id: &str,
    ) -> Result<RemoteStatus, PollError> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        self.poll_responses
            .lock()
            .await
            .pop_front()
            .unwrap_or(Err(PollError::NotFound))
    }

    /// Treats the payload as the raw `submissionId` string (tests compose
    /// callback bodies as plain UTF-8, unlike the XML/JSON envelopes the
    /// real drivers parse).
    async fn verify_callback(
        &self,
        _route: &RouteConfig,
        payload: &[u8],
    ) -> Result<(String, RemoteStatus), InvalidCallback> {
        let submission_id = std::str::from_utf8(payload)
            .map_err(|e| InvalidCallback(format!("non-utf8 callback payload: {e}")))?
            .to_string();
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        match self.poll_responses.lock().await.pop_front() {
            Some(Ok(status)) => Ok((submission_id, status)),
            Some(Err(e)) => Err(InvalidCallback(e.to_string())),
            None => Err(InvalidCallback("no scripted response queued".to_string())),
        }
    }

    fn kind(&self) -> &'static str {
        "STUB"
    }
}
