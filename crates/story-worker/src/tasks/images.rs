use std::collections::HashMap;

use story_gen::{AspectRatio, ImageToImageRequest, TextToImageRequest};
use story_models::{
    ImagePrompt, SceneImageResult, SceneImagesRequest, SceneImagesResult, SceneType,
    SideCharacterImage, SingleSceneImageRequest,
};
use story_queue::JobReporter;

use super::TaskContext;
use crate::error::WorkerResult;
use crate::fanout::FanOut;

/// How one scene image is generated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Scenery: prompt only
    TextToImage,
    /// Character scene: prompt plus reference images, main character first
    ImageToImage(Vec<String>),
}

/// Pick the generation mode and reference images for a scene.
///
/// The main character image is included unless every named character in the
/// scene is a known side character. Side characters are included only when
/// they have a portrait.
pub fn select_image_source(
    prompt: &ImagePrompt,
    main_character_image_url: &str,
    side_character_images: &[SideCharacterImage],
) -> ImageSource {
    if prompt.scene_type == SceneType::Scenery {
        return ImageSource::TextToImage;
    }

    let portraits: HashMap<&str, &str> = side_character_images
        .iter()
        .map(|image| (image.name.as_str(), image.image_url.as_str()))
        .collect();
    let names = &prompt.characters_in_scene;
    let only_side_characters =
        !names.is_empty() && names.iter().all(|name| portraits.contains_key(name.as_str()));

    let mut references = Vec::new();
    if !only_side_characters {
        references.push(main_character_image_url.to_string());
    }
    references.extend(
        names
            .iter()
            .filter_map(|name| portraits.get(name.as_str()))
            .filter(|url| !url.is_empty())
            .map(|url| url.to_string()),
    );
    ImageSource::ImageToImage(references)
}

async fn generate_scene_image(
    ctx: &TaskContext<'_>,
    prompt: &ImagePrompt,
    main_character_image_url: &str,
    side_character_images: &[SideCharacterImage],
) -> WorkerResult<String> {
    let url = match select_image_source(prompt, main_character_image_url, side_character_images) {
        ImageSource::TextToImage => {
            ctx.backend
                .text_to_image(&TextToImageRequest {
                    prompt: prompt.prompt.clone(),
                    aspect_ratio: AspectRatio::Landscape,
                })
                .await?
        }
        ImageSource::ImageToImage(reference_images) => {
            ctx.backend
                .image_to_image(&ImageToImageRequest {
                    prompt: prompt.prompt.clone(),
                    reference_images,
                    aspect_ratio: AspectRatio::Landscape,
                })
                .await?
        }
    };
    Ok(url)
}

pub(super) async fn scene_images(
    ctx: &TaskContext<'_>,
    reporter: &mut JobReporter,
    request: &SceneImagesRequest,
) -> WorkerResult<SceneImagesResult> {
    let fanout = FanOut {
        key: "scene_images",
        label: "scene image",
        max_concurrency: ctx.config.max_fanout,
    };
    let scene_images = fanout
        .run(
            reporter,
            ctx.logger,
            request.image_prompts.iter().collect(),
            |_, prompt| {
                generate_scene_image(
                    ctx,
                    prompt,
                    &request.character_image_url,
                    &request.side_character_images,
                )
            },
        )
        .await?;

    Ok(SceneImagesResult { scene_images })
}

pub(super) async fn single_scene_image(
    ctx: &TaskContext<'_>,
    request: &SingleSceneImageRequest,
) -> WorkerResult<SceneImageResult> {
    let image_url = generate_scene_image(
        ctx,
        &request.image_prompt,
        &request.character_image_url,
        &request.side_character_images,
    )
    .await?;

    Ok(SceneImageResult {
        scene_number: request.scene_number,
        image_url,
    })
}
