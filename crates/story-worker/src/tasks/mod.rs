//! Per-capability job bodies.

mod character;
mod images;
mod narration;
mod prompts;
mod script;
mod videos;

use serde_json::Value;

use story_gen::GenerationBackend;
use story_models::JobRequest;
use story_queue::JobReporter;

use crate::config::WorkerConfig;
use crate::error::WorkerResult;
use crate::logging::JobLogger;

pub use images::{select_image_source, ImageSource};
pub use script::check_script;

/// What a job body runs against.
pub struct TaskContext<'a> {
    pub backend: &'a dyn GenerationBackend,
    pub config: &'a WorkerConfig,
    pub logger: &'a JobLogger,
}

/// Run the body bound to the request's capability and return its result payload.
///
/// The reporter has already marked the job `STARTED`; bodies only write progress.
pub async fn run(
    ctx: &TaskContext<'_>,
    reporter: &mut JobReporter,
    request: &JobRequest,
) -> WorkerResult<Value> {
    let value = match request {
        JobRequest::GenerateScript(r) => {
            serde_json::to_value(script::generate_script(ctx, reporter, r).await?)?
        }
        JobRequest::GenerateCharacterImages(r) => {
            serde_json::to_value(character::character_images(ctx, reporter, r).await?)?
        }
        JobRequest::GenerateCharacterFromUpload(r) => {
            serde_json::to_value(character::character_from_upload(ctx, reporter, r).await?)?
        }
        JobRequest::GenerateSideCharacterImages(r) => {
            serde_json::to_value(character::side_character_images(ctx, reporter, r).await?)?
        }
        JobRequest::GenerateImagePrompts(r) => {
            serde_json::to_value(prompts::image_prompts(ctx, r).await?)?
        }
        JobRequest::GenerateSceneImages(r) => {
            serde_json::to_value(images::scene_images(ctx, reporter, r).await?)?
        }
        JobRequest::GenerateSingleSceneImage(r) => {
            serde_json::to_value(images::single_scene_image(ctx, r).await?)?
        }
        JobRequest::GenerateVideoPrompts(r) => {
            serde_json::to_value(prompts::video_prompts(ctx, r).await?)?
        }
        JobRequest::GenerateVideos(r) => {
            serde_json::to_value(videos::videos(ctx, reporter, r).await?)?
        }
        JobRequest::GenerateSingleVideo(r) => {
            serde_json::to_value(videos::single_video(ctx, r).await?)?
        }
        JobRequest::GenerateNarrations(r) => {
            serde_json::to_value(narration::narrations(ctx, reporter, r).await?)?
        }
        JobRequest::GenerateSingleNarration(r) => {
            serde_json::to_value(narration::single_narration(ctx, r).await?)?
        }
        JobRequest::GenerateFinalVideo(r) => {
            serde_json::to_value(videos::final_video(ctx, r).await?)?
        }
    };
    Ok(value)
}
