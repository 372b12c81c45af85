use story_gen::{
    AspectRatio, CharacterPromptRequest, ImageToImageRequest, SideCharacterPromptRequest,
    StyleConversionRequest, TextToImageRequest,
};
use story_models::{
    CharacterImagesRequest, CharacterOption, CharacterOptionsResult, CharacterUploadRequest,
    SideCharacterImage, SideCharacterImagesRequest, SideCharacterImagesResult,
};
use story_queue::JobReporter;

use super::TaskContext;
use crate::error::{WorkerError, WorkerResult};
use crate::fanout::FanOut;

pub(super) async fn character_images(
    ctx: &TaskContext<'_>,
    reporter: &mut JobReporter,
    request: &CharacterImagesRequest,
) -> WorkerResult<CharacterOptionsResult> {
    let prompt = ctx
        .backend
        .character_prompt(&CharacterPromptRequest {
            description: request.description.clone(),
            style: request.style.clone(),
        })
        .await?;

    let fanout = FanOut {
        key: "character_options",
        label: "character option",
        max_concurrency: ctx.config.max_fanout,
    };
    let options = fanout
        .run(reporter, ctx.logger, (0..request.count).collect(), |index, _| {
            let prompt = prompt.clone();
            async move {
                let url = ctx
                    .backend
                    .text_to_image(&TextToImageRequest {
                        prompt: prompt.clone(),
                        aspect_ratio: AspectRatio::Square,
                    })
                    .await?;
                Ok(CharacterOption {
                    id: index as u32 + 1,
                    url,
                    prompt,
                })
            }
        })
        .await?;

    Ok(CharacterOptionsResult {
        character_options: options,
    })
}

pub(super) async fn character_from_upload(
    ctx: &TaskContext<'_>,
    reporter: &mut JobReporter,
    request: &CharacterUploadRequest,
) -> WorkerResult<CharacterOptionsResult> {
    let mut prompts = ctx
        .backend
        .style_conversion_prompts(&StyleConversionRequest {
            image_url: request.image_url.clone(),
            style: request.style.clone(),
            description: request.description.clone(),
            count: request.count,
        })
        .await?;
    prompts.truncate(request.count as usize);
    if prompts.is_empty() {
        return Err(WorkerError::invalid_output("no style conversion prompts"));
    }

    let fanout = FanOut {
        key: "character_options",
        label: "character variation",
        max_concurrency: ctx.config.max_fanout,
    };
    let options = fanout
        .run(reporter, ctx.logger, prompts, |index, prompt| async move {
            let url = ctx
                .backend
                .image_to_image(&ImageToImageRequest {
                    prompt: prompt.clone(),
                    reference_images: vec![request.image_url.clone()],
                    aspect_ratio: AspectRatio::Square,
                })
                .await?;
            Ok(CharacterOption {
                id: index as u32 + 1,
                url,
                prompt,
            })
        })
        .await?;

    Ok(CharacterOptionsResult {
        character_options: options,
    })
}

pub(super) async fn side_character_images(
    ctx: &TaskContext<'_>,
    reporter: &mut JobReporter,
    request: &SideCharacterImagesRequest,
) -> WorkerResult<SideCharacterImagesResult> {
    let fanout = FanOut {
        key: "character_images",
        label: "side character",
        max_concurrency: ctx.config.max_fanout,
    };
    let images = fanout
        .run(
            reporter,
            ctx.logger,
            request.side_characters.clone(),
            |_, side_character| async move {
                let prompt = ctx
                    .backend
                    .side_character_prompt(&SideCharacterPromptRequest {
                        side_character: side_character.clone(),
                        style: request.style.clone(),
                        main_character_prompt: request.main_character_prompt.clone(),
                    })
                    .await?;
                let image_url = ctx
                    .backend
                    .text_to_image(&TextToImageRequest {
                        prompt,
                        aspect_ratio: AspectRatio::Square,
                    })
                    .await?;
                Ok(SideCharacterImage {
                    name: side_character.name,
                    kind: side_character.kind,
                    image_url,
                })
            },
        )
        .await?;

    Ok(SideCharacterImagesResult {
        character_images: images,
    })
}
