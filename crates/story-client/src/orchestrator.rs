//! The story generation stage graph.
//!
//! ```text
//! script ─┬─ narrations ─────────────────────────────────────┐
//!         └─ side characters ┬─ scene images ─┬─ videos ─────┴─ final cut
//!            image prompts ──┴─ video prompts ┘
//! ```
//!
//! Every stage reads the latest story document, checks its prerequisites,
//! submits one job and folds partial and final results back through the
//! [`StoryStore`]. Results are tagged with the document they were requested
//! from, so the store drops any that a later edit has made stale.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use story_models::{
    decode_batch, validate_script_text, CharacterImagesRequest, CharacterOption,
    CharacterOptionsResult, CharacterUploadRequest, FinalCutScene, FinalVideoRequest,
    FinalVideoResult, ImagePrompt, ImagePromptsRequest, ImagePromptsResult, JobRequest,
    Narration, NarrationInput, NarrationResult, NarrationsRequest, NarrationsResult,
    SceneImageResult, SceneImagesRequest, SceneImagesResult, ScriptRequest, ScriptResult,
    SideCharacterImage, SideCharacterImagesRequest, SideCharacterImagesResult,
    SingleNarrationRequest, SingleSceneImageRequest, SingleVideoRequest, StoryDocument,
    VideoPrompt, VideoPromptsRequest, VideoPromptsResult, VideoResult, VideosRequest,
    VideosResult,
};

use crate::error::{ClientError, ClientResult};
use crate::poller::{PollHandle, Poller};
use crate::store::{Artifact, CutSources, StoryAction, StoryStore};

/// A stage's prerequisite is not ready.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    #[error("No main character selected")]
    NoCharacter,

    #[error("The story has no scenes yet")]
    NoScenes,

    #[error("Scene {0} does not exist")]
    UnknownScene(u32),

    #[error("Scene {scene_number} has no script text")]
    MissingScriptText { scene_number: u32 },

    #[error("Scene {scene_number} has no image prompt")]
    MissingImagePrompt { scene_number: u32 },

    #[error("Scene {scene_number} has no video prompt")]
    MissingVideoPrompt { scene_number: u32 },

    #[error("Scene {scene_number} has no image")]
    MissingImage { scene_number: u32 },

    #[error("Scene {scene_number} has no video")]
    MissingVideo { scene_number: u32 },

    #[error("Scene {scene_number} has no narration")]
    MissingNarration { scene_number: u32 },
}

fn ready<T: Clone>(
    slots: &[Option<T>],
    missing: impl Fn(u32) -> GateError,
) -> Result<Vec<T>, GateError> {
    slots
        .iter()
        .enumerate()
        .map(|(index, slot)| slot.clone().ok_or_else(|| missing(index as u32 + 1)))
        .collect()
}

fn scene_slot(document: &StoryDocument, scene_number: u32) -> Result<usize, GateError> {
    document
        .scene_index(scene_number)
        .ok_or(GateError::UnknownScene(scene_number))
}

/// The main character has a name and a chosen image.
pub fn check_character(document: &StoryDocument) -> Result<String, GateError> {
    let character = &document.inputs.character;
    match &character.image_url {
        Some(url) if !url.is_empty() && !character.name.trim().is_empty() => Ok(url.clone()),
        _ => Err(GateError::NoCharacter),
    }
}

fn check_scenes(document: &StoryDocument) -> Result<(), GateError> {
    if document.scenes.is_empty() {
        return Err(GateError::NoScenes);
    }
    Ok(())
}

fn image_prompts(document: &StoryDocument) -> Result<Vec<ImagePrompt>, GateError> {
    check_scenes(document)?;
    ready(&document.image_prompts, |scene_number| {
        GateError::MissingImagePrompt { scene_number }
    })
}

/// Every scene has an image and a video prompt.
pub fn can_generate_videos(document: &StoryDocument) -> Result<(), GateError> {
    check_scenes(document)?;
    ready(&document.image_urls, |scene_number| GateError::MissingImage { scene_number })?;
    ready(&document.video_prompts, |scene_number| {
        GateError::MissingVideoPrompt { scene_number }
    })?;
    Ok(())
}

/// One scene has its own image and video prompt.
pub fn can_generate_scene_video(
    document: &StoryDocument,
    scene_number: u32,
) -> Result<(), GateError> {
    let index = scene_slot(document, scene_number)?;
    if document.image_urls[index].as_deref().map_or(true, str::is_empty) {
        return Err(GateError::MissingImage { scene_number });
    }
    if document.video_prompts[index].is_none() {
        return Err(GateError::MissingVideoPrompt { scene_number });
    }
    Ok(())
}

/// Every scene has a ready video and a ready narration.
pub fn can_generate_final_video(document: &StoryDocument) -> Result<(), GateError> {
    check_scenes(document)?;
    for (index, scene) in document.scenes.iter().enumerate() {
        if !document.has_video(index) {
            return Err(GateError::MissingVideo {
                scene_number: scene.scene_number,
            });
        }
        if !document.has_narration(index) {
            return Err(GateError::MissingNarration {
                scene_number: scene.scene_number,
            });
        }
    }
    Ok(())
}

fn narration_inputs(document: &StoryDocument) -> Result<Vec<NarrationInput>, GateError> {
    check_scenes(document)?;
    document
        .scenes
        .iter()
        .map(|scene| {
            if scene.script_text.trim().is_empty() {
                return Err(GateError::MissingScriptText {
                    scene_number: scene.scene_number,
                });
            }
            Ok(NarrationInput {
                scene_number: scene.scene_number,
                text: scene.script_text.clone(),
            })
        })
        .collect()
}

fn decode<T: DeserializeOwned>(value: Value) -> ClientResult<T> {
    serde_json::from_value(value).map_err(|e| ClientError::invalid_result(e.to_string()))
}

/// Drives the stage graph for one story.
#[derive(Clone)]
pub struct Orchestrator {
    poller: Arc<Poller>,
    store: StoryStore,
    handle: PollHandle,
    language: String,
}

impl Orchestrator {
    pub fn new(poller: Arc<Poller>, store: StoryStore) -> Self {
        Self {
            poller,
            store,
            handle: PollHandle::new(),
            language: "ko".to_string(),
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn store(&self) -> &StoryStore {
        &self.store
    }

    /// Abandon every poll this orchestrator started. Jobs keep running on
    /// the executor, their results are no longer applied.
    ///
    /// Clones share the cancellation and it cannot be undone: every later
    /// stage returns [`ClientError::Cancelled`] without submitting. Build a
    /// new orchestrator over the same store to start again.
    pub fn cancel(&self) {
        self.handle.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.handle.is_cancelled()
    }

    /// Submit `request` and poll it, merging batch partials as they arrive.
    async fn run_job<F>(&self, request: JobRequest, merge_partial: F) -> ClientResult<Value>
    where
        F: Fn(&Value) -> Option<StoryAction> + Send + Sync,
    {
        let capability = request.capability();
        if self.handle.is_cancelled() {
            info!(capability = %capability, "Orchestrator cancelled, stage not submitted");
            return Err(ClientError::Cancelled);
        }
        let store = self.store.clone();
        let result = self
            .poller
            .submit_and_poll(&request, &self.handle, |update| {
                if let Some(action) = update.partial_results.as_ref().and_then(&merge_partial) {
                    if store.send(action).is_err() {
                        warn!(capability = %capability, "Story store closed, partial results dropped");
                    }
                }
            })
            .await
            .and_then(|value| {
                if self.handle.is_cancelled() {
                    return Err(ClientError::Cancelled);
                }
                Ok(value)
            });
        if result.is_err() {
            // Partials sent before the failure stay in the document.
            self.store.settled().await?;
        }
        match &result {
            Ok(_) => info!(capability = %capability, "Stage finished"),
            Err(ClientError::Cancelled) => info!(capability = %capability, "Stage abandoned"),
            Err(e) => warn!(capability = %capability, error = %e, "Stage failed"),
        }
        result
    }

    /// Main character candidates from a text description.
    pub async fn generate_character_options(
        &self,
        description: &str,
        count: u32,
    ) -> ClientResult<Vec<CharacterOption>> {
        let document = self.store.snapshot();
        let request = JobRequest::GenerateCharacterImages(CharacterImagesRequest {
            description: description.to_string(),
            style: document.inputs.style.clone(),
            count,
        });
        self.character_options(request).await
    }

    /// Style-converted candidates from an uploaded image.
    pub async fn generate_character_from_upload(
        &self,
        image_url: &str,
        description: &str,
        count: u32,
    ) -> ClientResult<Vec<CharacterOption>> {
        let document = self.store.snapshot();
        let request = JobRequest::GenerateCharacterFromUpload(CharacterUploadRequest {
            image_url: image_url.to_string(),
            style: document.inputs.style.clone(),
            description: description.to_string(),
            count,
        });
        self.character_options(request).await
    }

    async fn character_options(&self, request: JobRequest) -> ClientResult<Vec<CharacterOption>> {
        let value = self
            .run_job(request, |partial| {
                let options = decode_batch::<CharacterOption>(partial, "character_options")?;
                Some(StoryAction::SetCharacterOptions(
                    options.into_iter().flatten().collect(),
                ))
            })
            .await?;
        let result: CharacterOptionsResult = decode(value)?;
        self.store
            .dispatch(StoryAction::SetCharacterOptions(result.character_options.clone()))
            .await?;
        Ok(result.character_options)
    }

    pub async fn generate_script(&self) -> ClientResult<()> {
        let document = self.store.snapshot();
        check_character(&document)?;
        let inputs = &document.inputs;
        let request = JobRequest::GenerateScript(ScriptRequest {
            character: inputs.character.clone(),
            style: inputs.style.clone(),
            themes: inputs.themes.clone(),
            custom_theme: inputs.custom_theme.clone(),
            scene_count: inputs.scene_count,
        });
        let result: ScriptResult = decode(self.run_job(request, |_| None).await?)?;
        self.store
            .dispatch(StoryAction::generated(&document, Artifact::Script(result)))
            .await?;
        Ok(())
    }

    /// Portraits for the blueprint's side characters. No job when there are none.
    pub async fn generate_side_character_images(&self) -> ClientResult<()> {
        let document = self.store.snapshot();
        check_scenes(&document)?;
        let side_characters = document
            .blueprint
            .as_ref()
            .map(|b| b.side_characters.clone())
            .unwrap_or_default();
        if side_characters.is_empty() {
            return Ok(());
        }
        let request = JobRequest::GenerateSideCharacterImages(SideCharacterImagesRequest {
            side_characters,
            style: document.inputs.style.clone(),
            main_character_image_url: document.inputs.character.image_url.clone(),
            main_character_prompt: document.inputs.character.prompt.clone().unwrap_or_default(),
        });
        let value = self
            .run_job(request, |partial| {
                decode_batch::<SideCharacterImage>(partial, "character_images").map(|images| {
                    StoryAction::generated(&document, Artifact::SideCharacterImages(images))
                })
            })
            .await?;
        let result: SideCharacterImagesResult = decode(value)?;
        self.store
            .dispatch(StoryAction::generated(
                &document,
                Artifact::SideCharacterImages(
                    result.character_images.into_iter().map(Some).collect(),
                ),
            ))
            .await?;
        Ok(())
    }

    pub async fn generate_image_prompts(&self) -> ClientResult<()> {
        let document = self.store.snapshot();
        check_scenes(&document)?;
        let request = JobRequest::GenerateImagePrompts(ImagePromptsRequest {
            scenes: document.scenes.clone(),
            character: document.inputs.character.clone(),
            style: document.inputs.style.clone(),
            blueprint: document.blueprint.clone().unwrap_or_default(),
        });
        let result: ImagePromptsResult = decode(self.run_job(request, |_| None).await?)?;
        self.store
            .dispatch(StoryAction::generated(
                &document,
                Artifact::ImagePrompts(result.image_prompts.into_iter().map(Some).collect()),
            ))
            .await?;
        Ok(())
    }

    /// Needs every image prompt and the side character portraits.
    pub async fn generate_scene_images(&self) -> ClientResult<()> {
        let document = self.store.snapshot();
        let character_image_url = check_character(&document)?;
        let request = JobRequest::GenerateSceneImages(SceneImagesRequest {
            image_prompts: image_prompts(&document)?,
            character_image_url,
            style: document.inputs.style.clone(),
            side_character_images: document.side_character_images.clone(),
        });
        let value = self
            .run_job(request, |partial| {
                decode_batch::<String>(partial, "scene_images")
                    .map(|urls| StoryAction::generated(&document, Artifact::SceneImages(urls)))
            })
            .await?;
        let result: SceneImagesResult = decode(value)?;
        self.store
            .dispatch(StoryAction::generated(
                &document,
                Artifact::SceneImages(result.scene_images.into_iter().map(Some).collect()),
            ))
            .await?;
        Ok(())
    }

    /// Needs the image prompts, not the images.
    pub async fn generate_video_prompts(&self) -> ClientResult<()> {
        let document = self.store.snapshot();
        let request = JobRequest::GenerateVideoPrompts(VideoPromptsRequest {
            image_prompts: image_prompts(&document)?,
            scenes: document.scenes.clone(),
            character_prompt: document.inputs.character.prompt.clone().unwrap_or_default(),
            style: document.inputs.style.clone(),
            blueprint: document.blueprint.clone().unwrap_or_default(),
        });
        let result: VideoPromptsResult = decode(self.run_job(request, |_| None).await?)?;
        self.store
            .dispatch(StoryAction::generated(
                &document,
                Artifact::VideoPrompts(result.video_prompts.into_iter().map(Some).collect()),
            ))
            .await?;
        Ok(())
    }

    pub async fn generate_videos(&self) -> ClientResult<()> {
        let document = self.store.snapshot();
        can_generate_videos(&document)?;
        let request = JobRequest::GenerateVideos(VideosRequest {
            scene_images: document.image_urls.iter().flatten().cloned().collect(),
            video_prompts: document.video_prompts.iter().flatten().cloned().collect(),
        });
        let videos = |urls: Vec<Option<String>>| {
            StoryAction::generated(
                &document,
                Artifact::Videos {
                    urls,
                    source_images: document.image_urls.clone(),
                },
            )
        };
        let value = self
            .run_job(request, |partial| decode_batch::<String>(partial, "videos").map(videos))
            .await?;
        let result: VideosResult = decode(value)?;
        self.store
            .dispatch(videos(result.videos.into_iter().map(Some).collect()))
            .await?;
        Ok(())
    }

    pub async fn generate_narrations(&self) -> ClientResult<()> {
        let document = self.store.snapshot();
        let request = JobRequest::GenerateNarrations(NarrationsRequest {
            scenes: narration_inputs(&document)?,
            voice_id: document.inputs.narration_voice.clone(),
            language: self.language.clone(),
            include_phonemes: true,
        });
        let source_texts: Vec<String> =
            document.scenes.iter().map(|s| s.script_text.clone()).collect();
        let narrations = |entries: Vec<Option<Narration>>| {
            StoryAction::generated(
                &document,
                Artifact::Narrations {
                    narrations: entries,
                    source_texts: source_texts.clone(),
                },
            )
        };
        let value = self
            .run_job(request, |partial| {
                decode_batch::<Narration>(partial, "narrations").map(narrations)
            })
            .await?;
        let result: NarrationsResult = decode(value)?;
        self.store
            .dispatch(narrations(result.narrations.into_iter().map(Some).collect()))
            .await?;
        Ok(())
    }

    /// Only offered once every scene has a video and a narration.
    pub async fn generate_final_video(&self) -> ClientResult<String> {
        let document = self.store.snapshot();
        can_generate_final_video(&document)?;
        let scenes = document
            .scenes
            .iter()
            .zip(document.video_urls.iter().flatten())
            .zip(document.narrations.iter().flatten())
            .map(|((scene, video_url), narration)| FinalCutScene {
                video_url: video_url.clone(),
                narration_url: narration.url.clone(),
                subtitle_text: scene.script_text.clone(),
                phonemes: narration.phonemes.clone(),
                duration: narration.duration,
            })
            .collect();
        let request = JobRequest::GenerateFinalVideo(FinalVideoRequest { scenes });
        let result: FinalVideoResult = decode(self.run_job(request, |_| None).await?)?;
        self.store
            .dispatch(StoryAction::generated(
                &document,
                Artifact::FinalVideo {
                    url: result.final_video_url.clone(),
                    sources: CutSources::of(&document),
                },
            ))
            .await?;
        Ok(result.final_video_url)
    }

    /// Regenerate one scene's image. That scene's video is cleared.
    pub async fn regenerate_scene_image(&self, scene_number: u32) -> ClientResult<()> {
        let document = self.store.snapshot();
        let character_image_url = check_character(&document)?;
        let index = scene_slot(&document, scene_number)?;
        let image_prompt = document.image_prompts[index]
            .clone()
            .ok_or(GateError::MissingImagePrompt { scene_number })?;
        let request = JobRequest::GenerateSingleSceneImage(SingleSceneImageRequest {
            scene_number,
            image_prompt,
            character_image_url,
            style: document.inputs.style.clone(),
            side_character_images: document.side_character_images.clone(),
        });
        let result: SceneImageResult = decode(self.run_job(request, |_| None).await?)?;
        self.store
            .dispatch(StoryAction::generated(
                &document,
                Artifact::SceneImage {
                    scene_number,
                    url: result.image_url,
                },
            ))
            .await?;
        Ok(())
    }

    /// Regenerate one scene's video from its own image and prompt.
    pub async fn regenerate_scene_video(&self, scene_number: u32) -> ClientResult<()> {
        let document = self.store.snapshot();
        can_generate_scene_video(&document, scene_number)?;
        let index = scene_slot(&document, scene_number)?;
        let source_image = document.image_urls[index].clone().unwrap_or_default();
        let request = JobRequest::GenerateSingleVideo(SingleVideoRequest {
            scene_number,
            image_url: source_image.clone(),
            video_prompt: document.video_prompts[index]
                .as_ref()
                .map(|p: &VideoPrompt| p.prompt.clone())
                .unwrap_or_default(),
        });
        let result: VideoResult = decode(self.run_job(request, |_| None).await?)?;
        self.store
            .dispatch(StoryAction::generated(
                &document,
                Artifact::SceneVideo {
                    scene_number,
                    url: result.video_url,
                    source_image,
                },
            ))
            .await?;
        Ok(())
    }

    pub async fn regenerate_scene_narration(&self, scene_number: u32) -> ClientResult<()> {
        let document = self.store.snapshot();
        let index = scene_slot(&document, scene_number)?;
        let text = document.scenes[index].script_text.clone();
        if text.trim().is_empty() {
            return Err(GateError::MissingScriptText { scene_number }.into());
        }
        let request = JobRequest::GenerateSingleNarration(SingleNarrationRequest {
            scene_number,
            text: text.clone(),
            voice_id: document.inputs.narration_voice.clone(),
            language: self.language.clone(),
            include_phonemes: true,
        });
        let result: NarrationResult = decode(self.run_job(request, |_| None).await?)?;
        self.store
            .dispatch(StoryAction::generated(
                &document,
                Artifact::SceneNarration {
                    scene_number,
                    narration: result.narration,
                    source_text: text,
                },
            ))
            .await?;
        Ok(())
    }

    /// Save new text for one scene and regenerate only that scene's narration.
    pub async fn edit_script_text(&self, scene_number: u32, text: &str) -> ClientResult<()> {
        validate_script_text(text).map_err(|e| ClientError::InvalidInput(e.to_string()))?;
        let index = scene_slot(&self.store.snapshot(), scene_number)?;
        self.store
            .dispatch(StoryAction::EditScriptText {
                scene_number,
                text: text.to_string(),
            })
            .await?;
        // Unchanged text keeps its narration.
        if self.store.snapshot().has_narration(index) {
            return Ok(());
        }
        self.regenerate_scene_narration(scene_number).await
    }

    /// Side character portraits and image prompts, then scene images and
    /// video prompts.
    async fn image_branch(&self) -> ClientResult<()> {
        tokio::try_join!(
            self.generate_side_character_images(),
            self.generate_image_prompts()
        )?;
        tokio::try_join!(self.generate_scene_images(), self.generate_video_prompts())?;
        Ok(())
    }

    /// Run every stage from the script to the final cut.
    pub async fn run_pipeline(&self) -> ClientResult<String> {
        self.generate_script().await?;
        tokio::try_join!(self.generate_narrations(), self.image_branch())?;
        self.generate_videos().await?;
        self.generate_final_video().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use story_models::{ScriptScene, StoryInputs};

    fn document(scenes: u32) -> StoryDocument {
        let mut doc = StoryDocument {
            inputs: StoryInputs::default(),
            scenes: (1..=scenes)
                .map(|n| ScriptScene {
                    scene_number: n,
                    script_text: "문장".into(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        };
        doc.align_to_scenes();
        doc
    }

    fn complete(scenes: u32) -> StoryDocument {
        let mut doc = document(scenes);
        for index in 0..scenes as usize {
            doc.video_urls[index] = Some(format!("v{}", index));
            doc.narrations[index] = Some(Narration {
                url: format!("n{}", index),
                duration: 1.5,
                phonemes: None,
            });
        }
        doc
    }

    #[test]
    fn test_final_video_gate_names_missing_scene() {
        assert_eq!(can_generate_final_video(&complete(5)), Ok(()));

        let mut doc = complete(5);
        doc.video_urls[2] = None;
        assert_eq!(
            can_generate_final_video(&doc),
            Err(GateError::MissingVideo { scene_number: 3 })
        );

        let mut doc = complete(5);
        doc.narrations[4] = None;
        assert_eq!(
            can_generate_final_video(&doc),
            Err(GateError::MissingNarration { scene_number: 5 })
        );

        assert_eq!(can_generate_final_video(&document(0)), Err(GateError::NoScenes));
    }

    #[test]
    fn test_final_video_gate_rejects_empty_urls() {
        let mut doc = complete(2);
        doc.video_urls[1] = Some(String::new());
        assert_eq!(
            can_generate_final_video(&doc),
            Err(GateError::MissingVideo { scene_number: 2 })
        );
    }

    #[test]
    fn test_scene_video_gate_uses_only_that_scene() {
        let mut doc = document(3);
        doc.image_urls[1] = Some("i2".into());
        doc.video_prompts[1] = Some(VideoPrompt {
            scene_number: 2,
            prompt: "pan".into(),
        });
        assert_eq!(can_generate_scene_video(&doc, 2), Ok(()));
        assert_eq!(
            can_generate_scene_video(&doc, 1),
            Err(GateError::MissingImage { scene_number: 1 })
        );
        assert_eq!(can_generate_scene_video(&doc, 9), Err(GateError::UnknownScene(9)));
        assert_eq!(
            can_generate_videos(&doc),
            Err(GateError::MissingImage { scene_number: 1 })
        );
    }

    #[test]
    fn test_character_gate_needs_name_and_image() {
        let mut doc = document(1);
        assert_eq!(check_character(&doc), Err(GateError::NoCharacter));
        doc.inputs.character.name = "Bori".into();
        assert_eq!(check_character(&doc), Err(GateError::NoCharacter));
        doc.inputs.character.image_url = Some("bori.png".into());
        assert_eq!(check_character(&doc), Ok("bori.png".to_string()));
    }
}
