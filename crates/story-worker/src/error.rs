//! Worker error types.

use std::time::Duration;

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Job failed: {0}")]
    JobFailed(String),

    /// One sub-task of a fan-out batch failed; `index` is zero-based.
    #[error("Item {} of {total} failed: {message}", .index + 1)]
    SubTaskFailed {
        index: usize,
        total: usize,
        message: String,
    },

    #[error("Invalid generation output: {0}")]
    InvalidOutput(String),

    #[error("Job exceeded the time limit of {0:?}")]
    TimeLimitExceeded(Duration),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Generation error: {0}")]
    Generation(#[from] story_gen::GenError),

    #[error("Queue error: {0}")]
    Queue(#[from] story_queue::QueueError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WorkerError {
    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }

    pub fn invalid_output(msg: impl Into<String>) -> Self {
        Self::InvalidOutput(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::Generation(e) => e.is_retryable(),
            WorkerError::Queue(e) => e.is_unavailable(),
            _ => false,
        }
    }
}
