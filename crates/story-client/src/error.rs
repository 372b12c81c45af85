//! Client error types.

use thiserror::Error;

use crate::orchestrator::GateError;

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The job or project does not exist. Not retryable without resubmitting.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The request never got a usable answer (network, 5xx, refused submission).
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request rejected ({status}): {detail}")]
    Rejected { status: u16, detail: String },

    /// The job reached `FAILURE`.
    #[error("Job failed: {0}")]
    JobFailed(String),

    /// The poller was abandoned by its owner.
    #[error("Polling cancelled")]
    Cancelled,

    #[error("Invalid job result: {0}")]
    InvalidResult(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Gate(#[from] GateError),

    /// The story store actor has stopped.
    #[error("Story store closed")]
    StoreClosed,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClientError {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn invalid_result(msg: impl Into<String>) -> Self {
        Self::InvalidResult(msg.into())
    }

    /// Whether repeating the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Transport(_))
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        ClientError::Transport(e.to_string())
    }
}
