//! Job status poller.
//!
//! `Polling → {Resolved, Rejected}`: one status read per tick on a fixed
//! interval, progress reported while the job runs, the result or error
//! returned once it is terminal.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;
use tracing::debug;

use story_models::{JobId, JobRequest, JobState, JobStatus};

use crate::api::JobApi;
use crate::clock::Clock;
use crate::config::PollerConfig;
use crate::error::{ClientError, ClientResult};

/// Cancels every poll it is passed to. Clones share one flag.
///
/// Dropping a handle does not cancel anything.
#[derive(Debug, Clone)]
pub struct PollHandle {
    cancelled: Arc<watch::Sender<bool>>,
}

impl Default for PollHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl PollHandle {
    pub fn new() -> Self {
        let (cancelled, _) = watch::channel(false);
        Self {
            cancelled: Arc::new(cancelled),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.cancelled.subscribe();
        // The sender lives in self, so wait_for only fails if it is dropped.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

/// What a running job has reported so far.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub current: u32,
    pub total: u32,
    pub status: String,
    pub partial_results: Option<Value>,
}

impl ProgressUpdate {
    fn from_status(status: &JobStatus) -> Option<Self> {
        let progress = status.progress?;
        Some(Self {
            current: progress.current,
            total: progress.total,
            status: status.status.clone(),
            partial_results: status.partial_results.clone(),
        })
    }
}

pub struct Poller {
    api: Arc<dyn JobApi>,
    clock: Arc<dyn Clock>,
    config: PollerConfig,
}

impl Poller {
    pub fn new(api: Arc<dyn JobApi>, clock: Arc<dyn Clock>, config: PollerConfig) -> Self {
        Self { api, clock, config }
    }

    pub fn api(&self) -> &Arc<dyn JobApi> {
        &self.api
    }

    /// Submit a job and poll it to completion.
    pub async fn submit_and_poll<F>(
        &self,
        request: &JobRequest,
        handle: &PollHandle,
        on_progress: F,
    ) -> ClientResult<Value>
    where
        F: FnMut(ProgressUpdate) + Send,
    {
        let submitted = self.api.submit(request).await?;
        debug!(
            job_id = %submitted.job_id,
            capability = %request.capability(),
            "Job submitted"
        );
        self.poll(&submitted.job_id, handle, on_progress).await
    }

    /// Poll a job until it is terminal.
    ///
    /// Returns the job result on `SUCCESS`, [`ClientError::JobFailed`] on
    /// `FAILURE` and [`ClientError::Cancelled`] once `handle` is cancelled. A
    /// failed status read ends polling with that error. `on_progress` is never
    /// called after cancellation, including for a read already in flight.
    pub async fn poll<F>(
        &self,
        job_id: &JobId,
        handle: &PollHandle,
        mut on_progress: F,
    ) -> ClientResult<Value>
    where
        F: FnMut(ProgressUpdate) + Send,
    {
        loop {
            if handle.is_cancelled() {
                return Err(ClientError::Cancelled);
            }
            tokio::select! {
                biased;
                _ = handle.cancelled() => return Err(ClientError::Cancelled),
                _ = self.clock.sleep(self.config.interval) => {}
            }

            let status = self.api.get_status(job_id).await;
            if handle.is_cancelled() {
                debug!(job_id = %job_id, "Discarding status read after cancellation");
                return Err(ClientError::Cancelled);
            }
            let status = status?;

            match status.state {
                JobState::Started | JobState::Progress => {
                    if let Some(update) = ProgressUpdate::from_status(&status) {
                        on_progress(update);
                    }
                }
                JobState::Success => {
                    debug!(job_id = %job_id, "Job resolved");
                    return Ok(status.result.unwrap_or(Value::Null));
                }
                JobState::Failure => {
                    let error = status.error.unwrap_or(status.status);
                    debug!(job_id = %job_id, error = %error, "Job rejected");
                    return Err(ClientError::JobFailed(error));
                }
                JobState::Pending | JobState::Unknown => {}
            }
        }
    }
}
