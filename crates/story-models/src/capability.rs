//! Generation capabilities a job can be bound to.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A named generation capability.
///
/// The snake_case name is the wire identifier and the submission path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Script, scene list and visual blueprint
    GenerateScript,
    /// Main character options from a description
    GenerateCharacterImages,
    /// Style-converted variations of an uploaded character image
    GenerateCharacterFromUpload,
    /// Reference portraits for the blueprint's side characters
    GenerateSideCharacterImages,
    /// Per-scene image prompts
    GenerateImagePrompts,
    /// One image per scene
    GenerateSceneImages,
    /// Regenerate one scene's image
    GenerateSingleSceneImage,
    /// Per-scene video (motion) prompts
    GenerateVideoPrompts,
    /// One video per scene
    GenerateVideos,
    /// Regenerate one scene's video
    GenerateSingleVideo,
    /// One narration per scene
    GenerateNarrations,
    /// Regenerate one scene's narration
    GenerateSingleNarration,
    /// Final cut assembly
    GenerateFinalVideo,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown capability: {0}")]
pub struct UnknownCapability(pub String);

impl Capability {
    pub const ALL: [Capability; 13] = [
        Capability::GenerateScript,
        Capability::GenerateCharacterImages,
        Capability::GenerateCharacterFromUpload,
        Capability::GenerateSideCharacterImages,
        Capability::GenerateImagePrompts,
        Capability::GenerateSceneImages,
        Capability::GenerateSingleSceneImage,
        Capability::GenerateVideoPrompts,
        Capability::GenerateVideos,
        Capability::GenerateSingleVideo,
        Capability::GenerateNarrations,
        Capability::GenerateSingleNarration,
        Capability::GenerateFinalVideo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::GenerateScript => "generate_script",
            Capability::GenerateCharacterImages => "generate_character_images",
            Capability::GenerateCharacterFromUpload => "generate_character_from_upload",
            Capability::GenerateSideCharacterImages => "generate_side_character_images",
            Capability::GenerateImagePrompts => "generate_image_prompts",
            Capability::GenerateSceneImages => "generate_scene_images",
            Capability::GenerateSingleSceneImage => "generate_single_scene_image",
            Capability::GenerateVideoPrompts => "generate_video_prompts",
            Capability::GenerateVideos => "generate_videos",
            Capability::GenerateSingleVideo => "generate_single_video",
            Capability::GenerateNarrations => "generate_narrations",
            Capability::GenerateSingleNarration => "generate_single_narration",
            Capability::GenerateFinalVideo => "generate_final_video",
        }
    }

    /// Short human-readable label used in submission messages.
    pub fn description(&self) -> &'static str {
        match self {
            Capability::GenerateScript => "Story script generation",
            Capability::GenerateCharacterImages => "Character image generation",
            Capability::GenerateCharacterFromUpload => "Character variation generation",
            Capability::GenerateSideCharacterImages => "Side character image generation",
            Capability::GenerateImagePrompts => "Image prompt generation",
            Capability::GenerateSceneImages => "Scene image generation",
            Capability::GenerateSingleSceneImage => "Single scene image generation",
            Capability::GenerateVideoPrompts => "Video prompt generation",
            Capability::GenerateVideos => "Video generation",
            Capability::GenerateSingleVideo => "Single video generation",
            Capability::GenerateNarrations => "Narration generation",
            Capability::GenerateSingleNarration => "Single narration generation",
            Capability::GenerateFinalVideo => "Final video generation",
        }
    }

    /// Key under which a fan-out capability publishes its index-aligned results,
    /// both in `partial_results` and in the final `result`.
    pub fn batch_key(&self) -> Option<&'static str> {
        match self {
            Capability::GenerateCharacterImages | Capability::GenerateCharacterFromUpload => {
                Some("character_options")
            }
            Capability::GenerateSideCharacterImages => Some("character_images"),
            Capability::GenerateSceneImages => Some("scene_images"),
            Capability::GenerateVideos => Some("videos"),
            Capability::GenerateNarrations => Some("narrations"),
            _ => None,
        }
    }

    /// Whether the capability fans out over a sub-task list.
    pub fn is_batch(&self) -> bool {
        self.batch_key().is_some()
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = UnknownCapability;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Capability::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownCapability(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip_through_from_str() {
        for capability in Capability::ALL {
            assert_eq!(capability.as_str().parse::<Capability>().unwrap(), capability);
            let wire = serde_json::to_value(capability).unwrap();
            assert_eq!(wire, serde_json::Value::String(capability.as_str().to_string()));
        }
    }

    #[test]
    fn test_unknown_capability() {
        let err = "generate_music".parse::<Capability>().unwrap_err();
        assert_eq!(err, UnknownCapability("generate_music".into()));
    }

    #[test]
    fn test_batch_keys() {
        assert_eq!(Capability::GenerateSceneImages.batch_key(), Some("scene_images"));
        assert_eq!(Capability::GenerateVideos.batch_key(), Some("videos"));
        assert!(!Capability::GenerateSingleVideo.is_batch());
        assert!(!Capability::GenerateScript.is_batch());
    }
}
