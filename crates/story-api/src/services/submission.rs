//! Job submission and status reads.

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use story_models::{Capability, JobId, JobRecord, JobRequest, JobStatus, SubmitResponse};
use story_queue::{JobQueue, JobStore, QueuedJob};

use crate::error::{ApiError, ApiResult};
use crate::metrics;

/// Turns a capability payload into a `PENDING` job on the queue.
#[derive(Clone)]
pub struct SubmissionService {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn JobQueue>,
}

impl SubmissionService {
    pub fn new(store: Arc<dyn JobStore>, queue: Arc<dyn JobQueue>) -> Self {
        Self { store, queue }
    }

    /// Validate, record and enqueue a job. Returns before any work starts.
    ///
    /// When the queue refuses the job its record is removed again, so a
    /// rejected submission never leaves a job id behind.
    pub async fn submit(&self, capability: &str, payload: Value) -> ApiResult<SubmitResponse> {
        let capability: Capability = capability
            .parse()
            .map_err(|e: story_models::UnknownCapability| ApiError::bad_request(e.to_string()))?;
        let request = JobRequest::from_parts(capability, payload)
            .map_err(|e| ApiError::bad_request(format!("Invalid {} payload: {}", capability, e)))?;
        request
            .validate()
            .map_err(|e| ApiError::Validation(e.to_string()))?;

        let job_id = JobId::new();
        self.store
            .create(&JobRecord::new(job_id.clone(), capability))
            .await
            .map_err(|e| ApiError::unavailable(format!("Job store unavailable: {}", e)))?;

        if let Err(e) = self
            .queue
            .enqueue(&QueuedJob::new(job_id.clone(), request))
            .await
        {
            warn!(job_id = %job_id, capability = %capability, "Enqueue failed: {}", e);
            if let Err(cleanup) = self.store.delete(&job_id).await {
                warn!(job_id = %job_id, "Failed to remove rejected job record: {}", cleanup);
            }
            metrics::record_job_rejected(capability.as_str());
            return Err(ApiError::unavailable(format!("Job queue unavailable: {}", e)));
        }

        metrics::record_job_submitted(capability.as_str());
        info!(job_id = %job_id, capability = %capability, "Job submitted");
        Ok(SubmitResponse::pending(job_id, capability))
    }

    /// Current status of a job.
    pub async fn status(&self, job_id: &str) -> ApiResult<JobStatus> {
        let record = self
            .store
            .get(&JobId::from_string(job_id))
            .await
            .map_err(|e| ApiError::unavailable(format!("Job store unavailable: {}", e)))?
            .ok_or_else(|| ApiError::not_found(format!("Job {} not found", job_id)))?;
        Ok(JobStatus::from(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use story_models::JobState;
    use story_queue::{MemoryJobQueue, MemoryJobStore};

    fn service() -> (Arc<MemoryJobStore>, Arc<MemoryJobQueue>, SubmissionService) {
        let store = Arc::new(MemoryJobStore::new());
        let queue = Arc::new(MemoryJobQueue::new());
        let service = SubmissionService::new(store.clone(), queue.clone());
        (store, queue, service)
    }

    fn single_video() -> Value {
        json!({"scene_number": 1, "image_url": "https://img/1.png", "video_prompt": "pan"})
    }

    #[tokio::test]
    async fn test_submit_records_pending_job() {
        let (_store, queue, service) = service();
        let response = service.submit("generate_single_video", single_video()).await.unwrap();

        assert_eq!(response.status, "PENDING");
        assert_eq!(queue.len().await.unwrap(), 1);
        let status = service.status(response.job_id.as_str()).await.unwrap();
        assert_eq!(status.state, JobState::Pending);
    }

    #[tokio::test]
    async fn test_submit_rejects_unknown_capability_and_bad_payload() {
        let (_store, _queue, service) = service();
        assert!(matches!(
            service.submit("generate_music", single_video()).await,
            Err(ApiError::BadRequest(_))
        ));
        assert!(matches!(
            service.submit("generate_videos", json!({"foo": 1})).await,
            Err(ApiError::BadRequest(_))
        ));
        assert!(matches!(
            service
                .submit("generate_single_video", json!({"scene_number": 0, "image_url": "x", "video_prompt": "y"}))
                .await,
            Err(ApiError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_closed_queue_leaves_no_record() {
        let (store, queue, service) = service();
        queue.close();

        let err = service
            .submit("generate_single_video", single_video())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Unavailable(_)));
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_status_unknown_job() {
        let (_store, _queue, service) = service();
        assert!(matches!(
            service.status("missing").await,
            Err(ApiError::NotFound(_))
        ));
    }
}
