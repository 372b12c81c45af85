//! Capability request payloads.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::story::{
    CharacterProfile, ImagePrompt, PhonemeTiming, ScriptScene, SideCharacter, SideCharacterImage,
    VideoPrompt, VisualBlueprint,
};
use crate::Capability;

fn default_option_count() -> u32 {
    2
}

fn default_language() -> String {
    "ko".to_string()
}

fn default_include_phonemes() -> bool {
    true
}

/// Script generation: character + theme + style + scene count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ScriptRequest {
    #[validate(nested)]
    pub character: CharacterProfile,
    #[validate(length(min = 1))]
    pub style: String,
    #[serde(default)]
    pub themes: Vec<String>,
    #[serde(default)]
    pub custom_theme: String,
    #[validate(range(min = 1, max = 20))]
    pub scene_count: u32,
}

/// Main character options from a text description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct CharacterImagesRequest {
    #[validate(length(min = 1))]
    pub description: String,
    #[validate(length(min = 1))]
    pub style: String,
    #[serde(default = "default_option_count")]
    #[validate(range(min = 1, max = 4))]
    pub count: u32,
}

/// Style-converted variations of an uploaded image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct CharacterUploadRequest {
    #[validate(url)]
    pub image_url: String,
    #[validate(length(min = 1))]
    pub style: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_option_count")]
    #[validate(range(min = 1, max = 4))]
    pub count: u32,
}

/// Reference portraits for the blueprint's side characters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct SideCharacterImagesRequest {
    pub side_characters: Vec<SideCharacter>,
    #[validate(length(min = 1))]
    pub style: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_character_image_url: Option<String>,
    #[serde(default)]
    pub main_character_prompt: String,
}

/// Per-scene image prompts from the script and blueprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ImagePromptsRequest {
    #[validate(length(min = 1))]
    pub scenes: Vec<ScriptScene>,
    #[validate(nested)]
    pub character: CharacterProfile,
    #[validate(length(min = 1))]
    pub style: String,
    #[serde(default)]
    pub blueprint: VisualBlueprint,
}

/// One image per scene prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct SceneImagesRequest {
    #[validate(length(min = 1))]
    pub image_prompts: Vec<ImagePrompt>,
    #[validate(length(min = 1))]
    pub character_image_url: String,
    #[validate(length(min = 1))]
    pub style: String,
    #[serde(default)]
    pub side_character_images: Vec<SideCharacterImage>,
}

/// Regenerate a single scene image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct SingleSceneImageRequest {
    #[validate(range(min = 1))]
    pub scene_number: u32,
    pub image_prompt: ImagePrompt,
    #[validate(length(min = 1))]
    pub character_image_url: String,
    #[validate(length(min = 1))]
    pub style: String,
    #[serde(default)]
    pub side_character_images: Vec<SideCharacterImage>,
}

/// Per-scene motion prompts. Needs image prompts, not images.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_video_prompts_request"))]
pub struct VideoPromptsRequest {
    #[validate(length(min = 1))]
    pub scenes: Vec<ScriptScene>,
    pub image_prompts: Vec<ImagePrompt>,
    #[serde(default)]
    pub character_prompt: String,
    #[validate(length(min = 1))]
    pub style: String,
    #[serde(default)]
    pub blueprint: VisualBlueprint,
}

fn validate_video_prompts_request(req: &VideoPromptsRequest) -> Result<(), ValidationError> {
    if req.scenes.len() != req.image_prompts.len() {
        return Err(ValidationError::new("scene_prompt_count_mismatch"));
    }
    Ok(())
}

/// One video per (scene image, video prompt) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_videos_request"))]
pub struct VideosRequest {
    #[validate(length(min = 1))]
    pub scene_images: Vec<String>,
    pub video_prompts: Vec<VideoPrompt>,
}

fn validate_videos_request(req: &VideosRequest) -> Result<(), ValidationError> {
    if req.scene_images.len() != req.video_prompts.len() {
        return Err(ValidationError::new("image_prompt_count_mismatch"));
    }
    if req.scene_images.iter().any(|url| url.is_empty()) {
        return Err(ValidationError::new("missing_scene_image"));
    }
    Ok(())
}

/// Regenerate a single scene video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct SingleVideoRequest {
    #[validate(range(min = 1))]
    pub scene_number: u32,
    #[validate(length(min = 1))]
    pub image_url: String,
    #[validate(length(min = 1))]
    pub video_prompt: String,
}

/// Text of one scene to narrate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct NarrationInput {
    #[validate(range(min = 1))]
    pub scene_number: u32,
    #[validate(length(min = 1))]
    pub text: String,
}

/// One narration per scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct NarrationsRequest {
    #[validate(length(min = 1), nested)]
    pub scenes: Vec<NarrationInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_include_phonemes")]
    pub include_phonemes: bool,
}

/// Regenerate a single scene narration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct SingleNarrationRequest {
    #[validate(range(min = 1))]
    pub scene_number: u32,
    #[validate(length(min = 1))]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_include_phonemes")]
    pub include_phonemes: bool,
}

/// One scene of the final cut.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct FinalCutScene {
    #[validate(length(min = 1))]
    pub video_url: String,
    #[validate(length(min = 1))]
    pub narration_url: String,
    #[serde(default)]
    pub subtitle_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phonemes: Option<PhonemeTiming>,
    #[validate(range(min = 0.0))]
    pub duration: f64,
}

/// Assemble every scene into the final video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct FinalVideoRequest {
    #[validate(length(min = 1), nested)]
    pub scenes: Vec<FinalCutScene>,
}

/// A unit of work bound to a capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "capability", content = "payload", rename_all = "snake_case")]
pub enum JobRequest {
    GenerateScript(ScriptRequest),
    GenerateCharacterImages(CharacterImagesRequest),
    GenerateCharacterFromUpload(CharacterUploadRequest),
    GenerateSideCharacterImages(SideCharacterImagesRequest),
    GenerateImagePrompts(ImagePromptsRequest),
    GenerateSceneImages(SceneImagesRequest),
    GenerateSingleSceneImage(SingleSceneImageRequest),
    GenerateVideoPrompts(VideoPromptsRequest),
    GenerateVideos(VideosRequest),
    GenerateSingleVideo(SingleVideoRequest),
    GenerateNarrations(NarrationsRequest),
    GenerateSingleNarration(SingleNarrationRequest),
    GenerateFinalVideo(FinalVideoRequest),
}

impl JobRequest {
    /// Build a request from a capability and its raw payload.
    pub fn from_parts(capability: Capability, payload: Value) -> serde_json::Result<Self> {
        serde_json::from_value(json!({
            "capability": capability.as_str(),
            "payload": payload,
        }))
    }

    /// Capability this request is bound to.
    pub fn capability(&self) -> Capability {
        match self {
            JobRequest::GenerateScript(_) => Capability::GenerateScript,
            JobRequest::GenerateCharacterImages(_) => Capability::GenerateCharacterImages,
            JobRequest::GenerateCharacterFromUpload(_) => Capability::GenerateCharacterFromUpload,
            JobRequest::GenerateSideCharacterImages(_) => Capability::GenerateSideCharacterImages,
            JobRequest::GenerateImagePrompts(_) => Capability::GenerateImagePrompts,
            JobRequest::GenerateSceneImages(_) => Capability::GenerateSceneImages,
            JobRequest::GenerateSingleSceneImage(_) => Capability::GenerateSingleSceneImage,
            JobRequest::GenerateVideoPrompts(_) => Capability::GenerateVideoPrompts,
            JobRequest::GenerateVideos(_) => Capability::GenerateVideos,
            JobRequest::GenerateSingleVideo(_) => Capability::GenerateSingleVideo,
            JobRequest::GenerateNarrations(_) => Capability::GenerateNarrations,
            JobRequest::GenerateSingleNarration(_) => Capability::GenerateSingleNarration,
            JobRequest::GenerateFinalVideo(_) => Capability::GenerateFinalVideo,
        }
    }

    /// Validate the payload before it is enqueued.
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        match self {
            JobRequest::GenerateScript(r) => r.validate(),
            JobRequest::GenerateCharacterImages(r) => r.validate(),
            JobRequest::GenerateCharacterFromUpload(r) => r.validate(),
            JobRequest::GenerateSideCharacterImages(r) => r.validate(),
            JobRequest::GenerateImagePrompts(r) => r.validate(),
            JobRequest::GenerateSceneImages(r) => r.validate(),
            JobRequest::GenerateSingleSceneImage(r) => r.validate(),
            JobRequest::GenerateVideoPrompts(r) => r.validate(),
            JobRequest::GenerateVideos(r) => r.validate(),
            JobRequest::GenerateSingleVideo(r) => r.validate(),
            JobRequest::GenerateNarrations(r) => r.validate(),
            JobRequest::GenerateSingleNarration(r) => r.validate(),
            JobRequest::GenerateFinalVideo(r) => r.validate(),
        }
    }

    /// The payload alone, as sent to `/api/jobs/{capability}`.
    pub fn payload(&self) -> serde_json::Result<Value> {
        let mut value = serde_json::to_value(self)?;
        Ok(value
            .get_mut("payload")
            .map(Value::take)
            .unwrap_or(Value::Null))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn videos_request(images: usize, prompts: usize) -> VideosRequest {
        VideosRequest {
            scene_images: (0..images).map(|i| format!("https://img/{i}.png")).collect(),
            video_prompts: (0..prompts)
                .map(|i| VideoPrompt {
                    scene_number: i as u32 + 1,
                    prompt: "slow pan".into(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_from_parts_uses_capability_tag() {
        let request = JobRequest::from_parts(
            Capability::GenerateSingleVideo,
            json!({"scene_number": 2, "image_url": "https://img/2.png", "video_prompt": "zoom in"}),
        )
        .unwrap();
        assert_eq!(request.capability(), Capability::GenerateSingleVideo);
        assert_eq!(
            request.payload().unwrap(),
            json!({"scene_number": 2, "image_url": "https://img/2.png", "video_prompt": "zoom in"})
        );
    }

    #[test]
    fn test_from_parts_rejects_wrong_shape() {
        let result = JobRequest::from_parts(Capability::GenerateVideos, json!({"images": []}));
        assert!(result.is_err());
    }

    #[test]
    fn test_videos_request_requires_matching_lengths() {
        assert!(JobRequest::GenerateVideos(videos_request(3, 3)).validate().is_ok());
        assert!(JobRequest::GenerateVideos(videos_request(3, 2)).validate().is_err());
    }

    #[test]
    fn test_script_request_scene_count_range() {
        let mut request = ScriptRequest {
            character: CharacterProfile {
                name: "Bori".into(),
                kind: "rabbit".into(),
                ..Default::default()
            },
            style: "watercolor".into(),
            themes: vec!["friendship".into()],
            custom_theme: String::new(),
            scene_count: 6,
        };
        assert!(request.validate().is_ok());

        request.scene_count = 0;
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_defaults_applied_on_narration_request() {
        let request = JobRequest::from_parts(
            Capability::GenerateNarrations,
            json!({"scenes": [{"scene_number": 1, "text": "Once upon a time"}]}),
        )
        .unwrap();
        match request {
            JobRequest::GenerateNarrations(r) => {
                assert_eq!(r.language, "ko");
                assert!(r.include_phonemes);
                assert!(r.voice_id.is_none());
            }
            other => panic!("unexpected request: {:?}", other),
        }
    }
}
