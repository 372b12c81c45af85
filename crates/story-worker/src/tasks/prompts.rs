use story_models::{
    ImagePromptsRequest, ImagePromptsResult, VideoPromptsRequest, VideoPromptsResult,
};

use super::TaskContext;
use crate::error::{WorkerError, WorkerResult};

pub(super) async fn image_prompts(
    ctx: &TaskContext<'_>,
    request: &ImagePromptsRequest,
) -> WorkerResult<ImagePromptsResult> {
    let mut image_prompts = ctx.backend.compose_image_prompts(request).await?;
    if image_prompts.len() != request.scenes.len() {
        return Err(WorkerError::invalid_output(format!(
            "expected {} image prompts, got {}",
            request.scenes.len(),
            image_prompts.len()
        )));
    }
    for (prompt, scene) in image_prompts.iter_mut().zip(&request.scenes) {
        prompt.scene_number = scene.scene_number;
        prompt.scene_type = scene.scene_type;
    }
    Ok(ImagePromptsResult { image_prompts })
}

pub(super) async fn video_prompts(
    ctx: &TaskContext<'_>,
    request: &VideoPromptsRequest,
) -> WorkerResult<VideoPromptsResult> {
    let mut video_prompts = ctx.backend.compose_video_prompts(request).await?;
    if video_prompts.len() != request.scenes.len() {
        return Err(WorkerError::invalid_output(format!(
            "expected {} video prompts, got {}",
            request.scenes.len(),
            video_prompts.len()
        )));
    }
    for (prompt, scene) in video_prompts.iter_mut().zip(&request.scenes) {
        prompt.scene_number = scene.scene_number;
    }
    Ok(VideoPromptsResult { video_prompts })
}
