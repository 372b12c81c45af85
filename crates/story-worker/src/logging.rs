//! Structured job logging.

use tracing::{error, info, warn, Span};

use story_models::{Capability, JobId};

/// Logs a job's lifecycle with its id and capability attached to every line.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    capability: Capability,
}

impl JobLogger {
    pub fn new(job_id: &JobId, capability: Capability) -> Self {
        Self {
            job_id: job_id.to_string(),
            capability,
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            capability = %self.capability,
            "Job started: {}", message
        );
    }

    pub fn log_progress(&self, current: u32, total: u32, message: &str) {
        info!(
            job_id = %self.job_id,
            capability = %self.capability,
            current,
            total,
            "Job progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            capability = %self.capability,
            "Job warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            capability = %self.capability,
            "Job error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            capability = %self.capability,
            "Job completed: {}", message
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }

    /// Span the whole job runs in.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            capability = %self.capability
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_logger_creation() {
        let job_id = JobId::new();
        let logger = JobLogger::new(&job_id, Capability::GenerateVideos);

        assert_eq!(logger.job_id(), job_id.to_string());
        assert_eq!(logger.capability(), Capability::GenerateVideos);
    }
}
