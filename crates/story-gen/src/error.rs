//! Generation client error types.

use thiserror::Error;

pub type GenResult<T> = Result<T, GenError>;

#[derive(Debug, Error)]
pub enum GenError {
    #[error("Generation service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Generation produced no output: {0}")]
    EmptyOutput(String),

    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GenError {
    pub fn empty_output(what: impl Into<String>) -> Self {
        Self::EmptyOutput(what.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GenError::ServiceUnavailable(_) | GenError::Timeout(_) | GenError::Network(_)
        )
    }
}
