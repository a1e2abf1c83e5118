use thiserror::Error;

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("authentication with the endpoint failed")]
    AuthError,
    #[error("endpoint unavailable")]
    Unavailable,
    #[error("endpoint rejected the submission: {0}")]
    Rejected(String),
    #[error("transport error: {0}")]
    Transport(String),
}

#[derive(Debug, Error)]
pub enum PollError {
    #[error("external id unknown to the endpoint")]
    NotFound,
    #[error("endpoint unavailable")]
    Unavailable,
    #[error("transport error: {0}")]
    Transport(String),
}

#[derive(Debug, Error)]
#[error("callback payload failed verification: {0}")]
pub struct InvalidCallback(pub String);

#[derive(Debug, Error)]
#[error("no driver registered for endpoint type {0}")]
pub struct UnknownEndpoint(pub String);
