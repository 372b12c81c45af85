//! Job submission and status reads.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use tracing::debug;

use story_models::{JobId, JobRequest, JobStatus, SubmitResponse};

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

/// The two job operations the poller and orchestrator need.
#[async_trait]
pub trait JobApi: Send + Sync {
    /// Enqueue a job. Returns before the work starts.
    async fn submit(&self, request: &JobRequest) -> ClientResult<SubmitResponse>;

    /// Read the current state of a job.
    async fn get_status(&self, job_id: &JobId) -> ClientResult<JobStatus>;
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: String,
}

/// Turn a non-success response into a client error.
pub(crate) async fn error_from_response(response: Response, what: &str) -> ClientError {
    let status = response.status();
    let detail = match response.text().await {
        Ok(body) => serde_json::from_str::<ErrorBody>(&body)
            .map(|b| b.detail)
            .unwrap_or(body),
        Err(e) => e.to_string(),
    };
    match status {
        StatusCode::NOT_FOUND => ClientError::NotFound(format!("{}: {}", what, detail)),
        s if s.is_server_error() => {
            ClientError::transport(format!("{} returned {}: {}", what, s, detail))
        }
        s => ClientError::Rejected {
            status: s.as_u16(),
            detail,
        },
    }
}

/// [`JobApi`] over the HTTP surface.
pub struct HttpJobApi {
    http: Client,
    config: ClientConfig,
}

impl HttpJobApi {
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        let http = config.build_http_client()?;
        Ok(Self { http, config })
    }
}

#[async_trait]
impl JobApi for HttpJobApi {
    async fn submit(&self, request: &JobRequest) -> ClientResult<SubmitResponse> {
        let capability = request.capability();
        let url = self.config.url(&format!("/api/jobs/{}", capability));
        debug!(capability = %capability, "Submitting job");

        let response = self.http.post(&url).json(&request.payload()?).send().await?;
        if !response.status().is_success() {
            return Err(error_from_response(response, capability.as_str()).await);
        }
        Ok(response.json().await?)
    }

    async fn get_status(&self, job_id: &JobId) -> ClientResult<JobStatus> {
        let url = self.config.url(&format!("/api/job/{}", job_id));
        let response = self.http.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(error_from_response(response, &format!("job {}", job_id)).await);
        }
        Ok(response.json().await?)
    }
}
