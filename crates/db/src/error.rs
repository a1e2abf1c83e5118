use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("submission not found")]
    NotFound,
    #[error("stored version does not match expected version")]
    Conflict,
    #[error("database error: {0}")]
    Backend(#[from] sqlx::Error),
    #[error("stored data could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
}
