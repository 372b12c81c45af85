//! Write path an executor uses for the one job it owns.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use story_models::{JobId, JobRecord, JobState};

use crate::error::{QueueError, QueueResult};
use crate::store::JobStore;

/// Applies lifecycle transitions to a job record and persists each one.
///
/// Transitions are checked against the in-memory copy first, so a rejected
/// update never reaches the store.
pub struct JobReporter {
    store: Arc<dyn JobStore>,
    record: JobRecord,
}

impl JobReporter {
    /// Load the record the executor is about to run.
    pub async fn load(store: Arc<dyn JobStore>, job_id: &JobId) -> QueueResult<Self> {
        let record = store
            .get(job_id)
            .await?
            .ok_or_else(|| QueueError::job_not_found(job_id.as_str()))?;
        Ok(Self { store, record })
    }

    pub fn job_id(&self) -> &JobId {
        &self.record.job_id
    }

    pub fn state(&self) -> JobState {
        self.record.state
    }

    pub fn record(&self) -> &JobRecord {
        &self.record
    }

    pub async fn started(&mut self, status: impl Into<String>) -> QueueResult<()> {
        self.record.start(status)?;
        self.persist().await
    }

    pub async fn progress(
        &mut self,
        current: u32,
        total: u32,
        status: impl Into<String>,
        partial_results: Option<Value>,
    ) -> QueueResult<()> {
        self.record
            .record_progress(current, total, status, partial_results)?;
        debug!(job_id = %self.record.job_id, current, total, "Recorded progress");
        self.persist().await
    }

    pub async fn succeeded(&mut self, result: Value) -> QueueResult<()> {
        self.record.succeed(result)?;
        self.persist().await
    }

    pub async fn failed(&mut self, error: impl Into<String>) -> QueueResult<()> {
        self.record.fail(error)?;
        self.persist().await
    }

    async fn persist(&self) -> QueueResult<()> {
        self.store.put(&self.record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryJobStore;
    use serde_json::json;
    use story_models::{Capability, JobTransitionError};

    async fn reporter() -> (Arc<MemoryJobStore>, JobReporter) {
        let store = Arc::new(MemoryJobStore::new());
        let record = JobRecord::new(JobId::new(), Capability::GenerateSceneImages);
        store.create(&record).await.unwrap();
        let reporter = JobReporter::load(store.clone(), &record.job_id).await.unwrap();
        (store, reporter)
    }

    #[tokio::test]
    async fn test_load_unknown_job() {
        let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
        let err = JobReporter::load(store, &JobId::from_string("missing"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, QueueError::JobNotFound(_)));
    }

    #[tokio::test]
    async fn test_every_transition_is_persisted() {
        let (store, mut reporter) = reporter().await;
        let job_id = reporter.job_id().clone();

        reporter.started("Starting").await.unwrap();
        assert_eq!(
            store.get(&job_id).await.unwrap().unwrap().state,
            JobState::Started
        );

        reporter
            .progress(1, 2, "1/2", Some(json!({"scene_images": ["a", null]})))
            .await
            .unwrap();
        let stored = store.get(&job_id).await.unwrap().unwrap();
        assert_eq!(stored.partial_results, Some(json!({"scene_images": ["a", null]})));

        reporter.failed("scene 2 failed").await.unwrap();
        let stored = store.get(&job_id).await.unwrap().unwrap();
        assert_eq!(stored.state, JobState::Failure);
        assert_eq!(stored.error.as_deref(), Some("scene 2 failed"));
        assert!(stored.partial_results.is_some());
    }

    #[tokio::test]
    async fn test_rejected_update_is_not_written() {
        let (store, mut reporter) = reporter().await;
        let job_id = reporter.job_id().clone();
        reporter.started("Starting").await.unwrap();
        reporter.progress(2, 4, "2/4", None).await.unwrap();

        let err = reporter.progress(1, 4, "1/4", None).await.unwrap_err();
        assert!(matches!(
            err,
            QueueError::Transition(JobTransitionError::ProgressRegressed { .. })
        ));
        let stored = store.get(&job_id).await.unwrap().unwrap();
        assert_eq!(stored.progress.map(|p| p.current), Some(2));

        reporter.succeeded(json!({"scene_images": []})).await.unwrap();
        assert!(reporter.failed("late").await.is_err());
        assert_eq!(
            store.get(&job_id).await.unwrap().unwrap().state,
            JobState::Success
        );
    }
}
