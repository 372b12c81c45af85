//! Generation service HTTP client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use story_models::{
    FinalVideoRequest, FinalVideoResult, ImagePrompt, ImagePromptsRequest, ImagePromptsResult,
    ScriptRequest, ScriptResult, VideoPrompt, VideoPromptsRequest, VideoPromptsResult,
};

use crate::backend::GenerationBackend;
use crate::error::{GenError, GenResult};
use crate::types::{
    CharacterPromptRequest, HealthResponse, ImageResponse, ImageToImageRequest,
    ImageToVideoRequest, PromptResponse, PromptsResponse, SideCharacterPromptRequest,
    SpeechResponse, StyleConversionRequest, TextToImageRequest, TextToSpeechRequest,
    VideoResponse,
};

/// Configuration for the generation client.
#[derive(Debug, Clone)]
pub struct GenClientConfig {
    /// Base URL of the generation service
    pub base_url: String,
    /// Request timeout
    pub timeout: Duration,
    /// Max retries
    pub max_retries: u32,
    /// First retry delay, doubled on every further attempt
    pub retry_base_delay: Duration,
}

impl Default for GenClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8001".to_string(),
            timeout: Duration::from_secs(300), // video generation can take minutes
            max_retries: 2,
            retry_base_delay: Duration::from_millis(500),
        }
    }
}

impl GenClientConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("GEN_SERVICE_URL")
                .unwrap_or_else(|_| "http://localhost:8001".to_string()),
            timeout: Duration::from_secs(
                std::env::var("GEN_SERVICE_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(300),
            ),
            max_retries: std::env::var("GEN_SERVICE_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
            ..Self::default()
        }
    }
}

/// Client for the generation service.
pub struct HttpGenerationClient {
    http: Client,
    config: GenClientConfig,
}

impl HttpGenerationClient {
    pub fn new(config: GenClientConfig) -> GenResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(GenError::Network)?;

        Ok(Self { http, config })
    }

    pub fn from_env() -> GenResult<Self> {
        Self::new(GenClientConfig::from_env())
    }

    /// POST a JSON body and decode the JSON reply, retrying transient failures.
    async fn post_json<Req, Resp>(&self, path: &str, body: &Req) -> GenResult<Resp>
    where
        Req: Serialize + ?Sized + Sync,
        Resp: DeserializeOwned + Send,
    {
        let url = format!("{}{}", self.config.base_url, path);
        debug!("Sending generation request to {}", url);

        self.with_retry(|| async {
            let response = self.http.post(&url).json(body).send().await.map_err(|e| {
                if e.is_timeout() {
                    GenError::Timeout(self.config.timeout.as_secs())
                } else {
                    GenError::Network(e)
                }
            })?;

            let status = response.status();
            if status.is_success() {
                return response
                    .json::<Resp>()
                    .await
                    .map_err(|e| GenError::InvalidResponse(e.to_string()));
            }

            let body = response.text().await.unwrap_or_default();
            if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                Err(GenError::ServiceUnavailable(format!(
                    "{} returned {}: {}",
                    path, status, body
                )))
            } else {
                Err(GenError::RequestFailed(format!(
                    "{} returned {}: {}",
                    path, status, body
                )))
            }
        })
        .await
    }

    /// Execute with retry logic.
    async fn with_retry<F, Fut, T>(&self, operation: F) -> GenResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = GenResult<T>>,
    {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = self.config.retry_base_delay * 2u32.pow(attempt);
                    warn!(
                        "Generation request failed (attempt {}), retrying in {:?}: {}",
                        attempt + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or(GenError::RequestFailed("Unknown error".to_string())))
    }
}

fn non_empty(value: String, what: &str) -> GenResult<String> {
    if value.trim().is_empty() {
        Err(GenError::empty_output(what))
    } else {
        Ok(value)
    }
}

#[async_trait]
impl GenerationBackend for HttpGenerationClient {
    async fn generate_script(&self, request: &ScriptRequest) -> GenResult<ScriptResult> {
        self.post_json("/v1/script", request).await
    }

    async fn character_prompt(&self, request: &CharacterPromptRequest) -> GenResult<String> {
        let response: PromptResponse = self.post_json("/v1/prompts/character", request).await?;
        non_empty(response.prompt, "character prompt")
    }

    async fn style_conversion_prompts(
        &self,
        request: &StyleConversionRequest,
    ) -> GenResult<Vec<String>> {
        let response: PromptsResponse = self
            .post_json("/v1/prompts/style-conversion", request)
            .await?;
        Ok(response.prompts)
    }

    async fn side_character_prompt(
        &self,
        request: &SideCharacterPromptRequest,
    ) -> GenResult<String> {
        let response: PromptResponse = self
            .post_json("/v1/prompts/side-character", request)
            .await?;
        non_empty(response.prompt, "side character prompt")
    }

    async fn text_to_image(&self, request: &TextToImageRequest) -> GenResult<String> {
        let response: ImageResponse = self
            .post_json("/v1/images/text-to-image", request)
            .await?;
        non_empty(response.image_url, "image")
    }

    async fn image_to_image(&self, request: &ImageToImageRequest) -> GenResult<String> {
        let response: ImageResponse = self
            .post_json("/v1/images/image-to-image", request)
            .await?;
        non_empty(response.image_url, "image")
    }

    async fn compose_image_prompts(
        &self,
        request: &ImagePromptsRequest,
    ) -> GenResult<Vec<ImagePrompt>> {
        let response: ImagePromptsResult =
            self.post_json("/v1/prompts/scene-images", request).await?;
        Ok(response.image_prompts)
    }

    async fn compose_video_prompts(
        &self,
        request: &VideoPromptsRequest,
    ) -> GenResult<Vec<VideoPrompt>> {
        let response: VideoPromptsResult = self.post_json("/v1/prompts/videos", request).await?;
        Ok(response.video_prompts)
    }

    async fn image_to_video(&self, request: &ImageToVideoRequest) -> GenResult<String> {
        let response: VideoResponse = self
            .post_json("/v1/videos/image-to-video", request)
            .await?;
        non_empty(response.video_url, "video")
    }

    async fn text_to_speech(&self, request: &TextToSpeechRequest) -> GenResult<SpeechResponse> {
        let response: SpeechResponse = self.post_json("/v1/speech", request).await?;
        if response.audio_url.trim().is_empty() {
            return Err(GenError::empty_output("narration audio"));
        }
        Ok(response)
    }

    async fn assemble_final_video(
        &self,
        request: &FinalVideoRequest,
    ) -> GenResult<FinalVideoResult> {
        self.post_json("/v1/videos/assemble", request).await
    }

    async fn health_check(&self) -> GenResult<bool> {
        let url = format!("{}/health", self.config.base_url);

        match self.http.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                let health: HealthResponse = response.json().await?;
                Ok(health.status == "healthy" || health.status == "ok")
            }
            Ok(response) => {
                warn!("Generation service health check failed: {}", response.status());
                Ok(false)
            }
            Err(e) => {
                warn!("Generation service health check error: {}", e);
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = GenClientConfig::default();
        assert_eq!(config.base_url, "http://localhost:8001");
        assert_eq!(config.timeout, Duration::from_secs(300));
        assert_eq!(config.max_retries, 2);
    }

    #[test]
    fn test_empty_output_is_not_retryable() {
        let err = non_empty("  ".to_string(), "image").unwrap_err();
        assert!(matches!(err, GenError::EmptyOutput(_)));
        assert!(!err.is_retryable());
    }
}
