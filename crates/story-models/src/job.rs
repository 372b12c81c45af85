//! Job definitions shared by the submission API, the executors and the pollers.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::Capability;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Job lifecycle state.
///
/// Transitions only move forward: `PENDING → STARTED → PROGRESS* → {SUCCESS|FAILURE}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    /// Enqueued, not yet picked up by an executor
    #[default]
    Pending,
    /// An executor has begun the job
    Started,
    /// The job reported progress at least once
    Progress,
    /// Terminal success, `result` is set
    Success,
    /// Terminal failure, `error` is set
    Failure,
    /// Any state string this build does not know about
    #[serde(other)]
    Unknown,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "PENDING",
            JobState::Started => "STARTED",
            JobState::Progress => "PROGRESS",
            JobState::Success => "SUCCESS",
            JobState::Failure => "FAILURE",
            JobState::Unknown => "UNKNOWN",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Success | JobState::Failure)
    }

    /// Check if an executor is actively working on the job.
    pub fn is_running(&self) -> bool {
        matches!(self, JobState::Started | JobState::Progress)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sub-task counters of a running job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct JobProgress {
    pub current: u32,
    pub total: u32,
}

impl JobProgress {
    pub fn new(current: u32, total: u32) -> Self {
        Self { current, total }
    }

    /// Completed fraction in `[0, 1]`; an empty sub-task list counts as done.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            f64::from(self.current) / f64::from(self.total)
        }
    }
}

/// Rejected job record mutation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobTransitionError {
    #[error("job {0} is already terminal ({1})")]
    Terminal(JobId, JobState),

    #[error("job {job_id} cannot move from {from} to {to}")]
    InvalidTransition {
        job_id: JobId,
        from: JobState,
        to: JobState,
    },

    #[error("job {job_id} total changed from {was} to {now}")]
    TotalChanged { job_id: JobId, was: u32, now: u32 },

    #[error("job {job_id} progress regressed from {was} to {now}")]
    ProgressRegressed { job_id: JobId, was: u32, now: u32 },

    #[error("job {job_id} progress {current} exceeds total {total}")]
    ProgressOverflow { job_id: JobId, current: u32, total: u32 },
}

/// Authoritative job record held by the job store.
///
/// Written only by the executor that owns the job; everyone else reads it.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobRecord {
    /// Unique job ID
    pub job_id: JobId,
    /// Capability the job is bound to
    pub capability: Capability,
    /// Lifecycle state
    pub state: JobState,
    /// Human-readable progress message
    pub status: String,
    /// Sub-task counters, present once the executor reports progress
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<JobProgress>,
    /// Growing snapshot of completed sub-task results
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_results: Option<Value>,
    /// Final payload, only on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failure cause, only on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
    /// Started at timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// Finished at timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// Create a pending record for a freshly submitted job.
    pub fn new(job_id: JobId, capability: Capability) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            capability,
            state: JobState::Pending,
            status: "Job is waiting to start...".to_string(),
            progress: None,
            partial_results: None,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
        }
    }

    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    fn ensure_open(&self) -> Result<(), JobTransitionError> {
        if self.is_terminal() {
            return Err(JobTransitionError::Terminal(self.job_id.clone(), self.state));
        }
        Ok(())
    }

    /// Mark the job as picked up by an executor.
    pub fn start(&mut self, status: impl Into<String>) -> Result<(), JobTransitionError> {
        self.ensure_open()?;
        if self.state != JobState::Pending {
            return Err(JobTransitionError::InvalidTransition {
                job_id: self.job_id.clone(),
                from: self.state,
                to: JobState::Started,
            });
        }
        let now = Utc::now();
        self.state = JobState::Started;
        self.status = status.into();
        self.started_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Record sub-task progress.
    ///
    /// `total` is fixed by the first report and `current` never decreases.
    /// A `None` partial payload keeps the previously recorded snapshot.
    pub fn record_progress(
        &mut self,
        current: u32,
        total: u32,
        status: impl Into<String>,
        partial_results: Option<Value>,
    ) -> Result<(), JobTransitionError> {
        self.ensure_open()?;
        if self.state == JobState::Pending {
            return Err(JobTransitionError::InvalidTransition {
                job_id: self.job_id.clone(),
                from: self.state,
                to: JobState::Progress,
            });
        }
        if current > total {
            return Err(JobTransitionError::ProgressOverflow {
                job_id: self.job_id.clone(),
                current,
                total,
            });
        }
        if let Some(prev) = self.progress {
            if prev.total != total {
                return Err(JobTransitionError::TotalChanged {
                    job_id: self.job_id.clone(),
                    was: prev.total,
                    now: total,
                });
            }
            if current < prev.current {
                return Err(JobTransitionError::ProgressRegressed {
                    job_id: self.job_id.clone(),
                    was: prev.current,
                    now: current,
                });
            }
        }

        self.state = JobState::Progress;
        self.status = status.into();
        self.progress = Some(JobProgress::new(current, total));
        if partial_results.is_some() {
            self.partial_results = partial_results;
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Mark the job as succeeded with its final payload.
    pub fn succeed(&mut self, result: Value) -> Result<(), JobTransitionError> {
        self.ensure_open()?;
        let now = Utc::now();
        self.state = JobState::Success;
        self.status = "Job completed successfully".to_string();
        self.result = Some(result);
        self.updated_at = now;
        self.finished_at = Some(now);
        Ok(())
    }

    /// Mark the job as failed. Partial results already written stay visible.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), JobTransitionError> {
        self.ensure_open()?;
        let now = Utc::now();
        self.state = JobState::Failure;
        self.status = "Job failed".to_string();
        self.error = Some(error.into());
        self.updated_at = now;
        self.finished_at = Some(now);
        Ok(())
    }
}

/// Job status payload returned to pollers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobStatus {
    pub job_id: JobId,
    pub state: JobState,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<JobProgress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_results: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&JobRecord> for JobStatus {
    fn from(record: &JobRecord) -> Self {
        Self {
            job_id: record.job_id.clone(),
            state: record.state,
            status: record.status.clone(),
            progress: record.progress,
            partial_results: record.partial_results.clone(),
            result: record.result.clone(),
            error: record.error.clone(),
        }
    }
}

impl From<JobRecord> for JobStatus {
    fn from(record: JobRecord) -> Self {
        Self {
            job_id: record.job_id,
            state: record.state,
            status: record.status,
            progress: record.progress,
            partial_results: record.partial_results,
            result: record.result,
            error: record.error,
        }
    }
}

/// Response to a job submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SubmitResponse {
    pub job_id: JobId,
    pub status: String,
    pub message: String,
}

impl SubmitResponse {
    /// Response for a job that was accepted and is waiting for an executor.
    pub fn pending(job_id: JobId, capability: Capability) -> Self {
        Self {
            job_id,
            status: JobState::Pending.as_str().to_string(),
            message: format!(
                "{} started. Poll /api/job/{{job_id}} for progress.",
                capability.description()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> JobRecord {
        JobRecord::new(JobId::new(), Capability::GenerateSceneImages)
    }

    #[test]
    fn test_job_state_wire_names() {
        assert_eq!(serde_json::to_value(JobState::Progress).unwrap(), json!("PROGRESS"));
        let state: JobState = serde_json::from_value(json!("RETRY")).unwrap();
        assert_eq!(state, JobState::Unknown);
        assert!(!state.is_terminal());
    }

    #[test]
    fn test_job_lifecycle() {
        let mut job = record();
        assert_eq!(job.state, JobState::Pending);

        job.start("Starting").unwrap();
        assert_eq!(job.state, JobState::Started);
        assert!(job.started_at.is_some());

        job.record_progress(1, 3, "1/3", Some(json!({"scene_images": ["a", null, null]})))
            .unwrap();
        assert_eq!(job.state, JobState::Progress);
        assert_eq!(job.progress, Some(JobProgress::new(1, 3)));

        job.succeed(json!({"scene_images": ["a", "b", "c"]})).unwrap();
        assert!(job.is_terminal());
        assert!(job.finished_at.is_some());
    }

    #[test]
    fn test_progress_total_is_fixed() {
        let mut job = record();
        job.start("Starting").unwrap();
        job.record_progress(0, 5, "0/5", None).unwrap();
        let err = job.record_progress(1, 6, "1/6", None).unwrap_err();
        assert!(matches!(err, JobTransitionError::TotalChanged { was: 5, now: 6, .. }));
    }

    #[test]
    fn test_progress_never_regresses() {
        let mut job = record();
        job.start("Starting").unwrap();
        job.record_progress(3, 5, "3/5", None).unwrap();
        let err = job.record_progress(2, 5, "2/5", None).unwrap_err();
        assert!(matches!(err, JobTransitionError::ProgressRegressed { was: 3, now: 2, .. }));
        assert_eq!(job.progress, Some(JobProgress::new(3, 5)));
    }

    #[test]
    fn test_progress_without_partial_keeps_snapshot() {
        let mut job = record();
        job.start("Starting").unwrap();
        job.record_progress(1, 2, "1/2", Some(json!({"videos": ["v1", null]})))
            .unwrap();
        job.record_progress(1, 2, "still working", None).unwrap();
        assert_eq!(job.partial_results, Some(json!({"videos": ["v1", null]})));
    }

    #[test]
    fn test_failure_keeps_partial_results() {
        let mut job = record();
        job.start("Starting").unwrap();
        job.record_progress(1, 2, "1/2", Some(json!({"videos": ["v1", null]})))
            .unwrap();
        job.fail("scene 2: provider timeout").unwrap();

        assert_eq!(job.state, JobState::Failure);
        assert_eq!(job.error.as_deref(), Some("scene 2: provider timeout"));
        assert!(job.partial_results.is_some());
        assert!(job.result.is_none());
    }

    #[test]
    fn test_terminal_job_rejects_writes() {
        let mut job = record();
        job.start("Starting").unwrap();
        job.fail("boom").unwrap();
        assert!(matches!(
            job.succeed(json!({})),
            Err(JobTransitionError::Terminal(_, JobState::Failure))
        ));
        assert!(job.record_progress(1, 1, "late", None).is_err());
    }

    #[test]
    fn test_progress_requires_start() {
        let mut job = record();
        assert!(matches!(
            job.record_progress(0, 1, "early", None),
            Err(JobTransitionError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_status_payload_omits_absent_fields() {
        let job = record();
        let value = serde_json::to_value(JobStatus::from(&job)).unwrap();
        assert_eq!(value["state"], json!("PENDING"));
        assert!(value.get("progress").is_none());
        assert!(value.get("result").is_none());
        assert!(value.get("error").is_none());
    }
}
