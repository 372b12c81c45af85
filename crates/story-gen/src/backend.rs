//! The generation capabilities the executors call.

use async_trait::async_trait;

use story_models::{
    FinalVideoRequest, FinalVideoResult, ImagePrompt, ImagePromptsRequest, ScriptRequest,
    ScriptResult, VideoPrompt, VideoPromptsRequest,
};

use crate::error::GenResult;
use crate::types::{
    CharacterPromptRequest, ImageToImageRequest, ImageToVideoRequest, SideCharacterPromptRequest,
    SpeechResponse, StyleConversionRequest, TextToImageRequest, TextToSpeechRequest,
};

/// Opaque, possibly slow, possibly failing generation calls.
///
/// Each call returns a URL or text. Implementations decide how the work is done.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Title, scene list and visual blueprint.
    async fn generate_script(&self, request: &ScriptRequest) -> GenResult<ScriptResult>;

    async fn character_prompt(&self, request: &CharacterPromptRequest) -> GenResult<String>;

    async fn style_conversion_prompts(
        &self,
        request: &StyleConversionRequest,
    ) -> GenResult<Vec<String>>;

    async fn side_character_prompt(
        &self,
        request: &SideCharacterPromptRequest,
    ) -> GenResult<String>;

    /// Returns the generated image URL.
    async fn text_to_image(&self, request: &TextToImageRequest) -> GenResult<String>;

    /// Returns the generated image URL.
    async fn image_to_image(&self, request: &ImageToImageRequest) -> GenResult<String>;

    async fn compose_image_prompts(
        &self,
        request: &ImagePromptsRequest,
    ) -> GenResult<Vec<ImagePrompt>>;

    async fn compose_video_prompts(
        &self,
        request: &VideoPromptsRequest,
    ) -> GenResult<Vec<VideoPrompt>>;

    /// Returns the generated video URL.
    async fn image_to_video(&self, request: &ImageToVideoRequest) -> GenResult<String>;

    async fn text_to_speech(&self, request: &TextToSpeechRequest) -> GenResult<SpeechResponse>;

    async fn assemble_final_video(&self, request: &FinalVideoRequest)
        -> GenResult<FinalVideoResult>;

    async fn health_check(&self) -> GenResult<bool> {
        Ok(true)
    }
}
