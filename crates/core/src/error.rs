use thiserror::Error;

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("unknown route: {0}")]
    UnknownRoute(String),
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),
    #[error("submission not found")]
    NotFound,
    #[error("submit failed: {0}")]
    SubmitFailed(String),
    #[error("update contended, retries exhausted")]
    Contended,
    #[error("invalid callback: {0}")]
    InvalidCallback(String),
    #[error("internal error: {0}")]
    Internal(String),
}
