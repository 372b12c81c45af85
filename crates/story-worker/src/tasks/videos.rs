use story_gen::ImageToVideoRequest;
use story_models::{
    FinalVideoRequest, FinalVideoResult, SingleVideoRequest, VideoResult, VideosRequest,
    VideosResult,
};
use story_queue::JobReporter;

use super::TaskContext;
use crate::error::{WorkerError, WorkerResult};
use crate::fanout::FanOut;

pub(super) async fn videos(
    ctx: &TaskContext<'_>,
    reporter: &mut JobReporter,
    request: &VideosRequest,
) -> WorkerResult<VideosResult> {
    let fanout = FanOut {
        key: "videos",
        label: "video",
        max_concurrency: ctx.config.max_fanout,
    };
    let pairs = request
        .scene_images
        .iter()
        .zip(&request.video_prompts)
        .collect();
    let videos = fanout
        .run(reporter, ctx.logger, pairs, |_, (image_url, prompt)| async move {
            let url = ctx
                .backend
                .image_to_video(&ImageToVideoRequest {
                    image_url: image_url.clone(),
                    prompt: prompt.prompt.clone(),
                })
                .await?;
            Ok(url)
        })
        .await?;

    Ok(VideosResult { videos })
}

pub(super) async fn single_video(
    ctx: &TaskContext<'_>,
    request: &SingleVideoRequest,
) -> WorkerResult<VideoResult> {
    let video_url = ctx
        .backend
        .image_to_video(&ImageToVideoRequest {
            image_url: request.image_url.clone(),
            prompt: request.video_prompt.clone(),
        })
        .await?;

    Ok(VideoResult {
        scene_number: request.scene_number,
        video_url,
    })
}

pub(super) async fn final_video(
    ctx: &TaskContext<'_>,
    request: &FinalVideoRequest,
) -> WorkerResult<FinalVideoResult> {
    ctx.logger
        .log_progress(0, 1, &format!("Assembling {} scenes", request.scenes.len()));
    let result = ctx.backend.assemble_final_video(request).await?;
    if result.final_video_url.trim().is_empty() {
        return Err(WorkerError::invalid_output("final video URL is empty"));
    }
    Ok(result)
}
