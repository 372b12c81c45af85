//! Story content: characters, scenes, prompts, blueprint and narration.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::Validate;

/// Maximum number of non-whitespace characters in one scene's script line.
pub const MAX_SCRIPT_CHARS: usize = 30;

/// Count the characters that count against [`MAX_SCRIPT_CHARS`].
pub fn script_char_count(text: &str) -> usize {
    text.chars().filter(|c| !c.is_whitespace()).count()
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptTextError {
    #[error("script text is empty")]
    Empty,

    #[error("script text has {0} characters, the limit is {MAX_SCRIPT_CHARS}")]
    TooLong(usize),
}

/// Check a scene script line against the length rule.
pub fn validate_script_text(text: &str) -> Result<(), ScriptTextError> {
    match script_char_count(text) {
        0 => Err(ScriptTextError::Empty),
        n if n > MAX_SCRIPT_CHARS => Err(ScriptTextError::TooLong(n)),
        _ => Ok(()),
    }
}

/// Whether a scene features characters or is pure scenery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum SceneType {
    #[default]
    Character,
    Scenery,
}

/// The main character as selected by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate, Default)]
pub struct CharacterProfile {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    /// Kind of character (animal, robot, child, ...)
    #[serde(rename = "type")]
    #[validate(length(min = 1, max = 50))]
    pub kind: String,
    #[serde(default)]
    pub personality: String,
    #[serde(default)]
    pub description: String,
    /// Selected reference image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Prompt the reference image was generated from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

/// One generated main character candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CharacterOption {
    pub id: u32,
    pub url: String,
    pub prompt: String,
}

/// User-controlled inputs every downstream artifact is derived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StoryInputs {
    pub character: CharacterProfile,
    pub style: String,
    #[serde(default)]
    pub themes: Vec<String>,
    #[serde(default)]
    pub custom_theme: String,
    pub scene_count: u32,
    /// Narration voice; not part of the input signature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narration_voice: Option<String>,
}

/// One scene of the generated script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
pub struct ScriptScene {
    /// 1-based, stable for the life of the story
    pub scene_number: u32,
    #[serde(default)]
    pub scene_type: SceneType,
    #[serde(default)]
    pub script_text: String,
}

impl ScriptScene {
    /// Empty placeholder used when the scene count grows.
    pub fn placeholder(scene_number: u32) -> Self {
        Self {
            scene_number,
            scene_type: SceneType::default(),
            script_text: String::new(),
        }
    }
}

/// A secondary character introduced by the script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SideCharacter {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub description: String,
}

/// A named location or object the blueprint keeps consistent across scenes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BlueprintEntry {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Cross-scene consistency record produced once by the script stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
pub struct VisualBlueprint {
    #[serde(default)]
    pub locations: Vec<BlueprintEntry>,
    #[serde(default)]
    pub objects: Vec<BlueprintEntry>,
    #[serde(default)]
    pub side_characters: Vec<SideCharacter>,
}

/// Reference portrait of a side character.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SideCharacterImage {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// Empty when generation produced nothing usable
    #[serde(default)]
    pub image_url: String,
}

/// Image prompt for one scene.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ImagePrompt {
    pub scene_number: u32,
    #[serde(default)]
    pub scene_type: SceneType,
    pub prompt: String,
    /// Names of every character appearing in the scene
    #[serde(default)]
    pub characters_in_scene: Vec<String>,
}

/// Motion prompt for one scene's video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct VideoPrompt {
    pub scene_number: u32,
    pub prompt: String,
}

/// Word-level timing used for subtitles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
pub struct PhonemeTiming {
    pub symbols: Vec<String>,
    pub start_times_seconds: Vec<f64>,
    pub durations_seconds: Vec<f64>,
}

impl PhonemeTiming {
    /// End of the last symbol, if any.
    pub fn total_duration(&self) -> Option<f64> {
        let start = self.start_times_seconds.last()?;
        let duration = self.durations_seconds.last()?;
        Some(start + duration)
    }
}

/// Generated narration audio for one scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Narration {
    pub url: String,
    /// Audio length in seconds
    pub duration: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phonemes: Option<PhonemeTiming>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_char_count_ignores_whitespace() {
        assert_eq!(script_char_count("a b\tc\n"), 3);
        assert_eq!(script_char_count("토끼가 숲으로 갔어요"), 9);
    }

    #[test]
    fn test_validate_script_text_limits() {
        let thirty = "가".repeat(MAX_SCRIPT_CHARS);
        assert!(validate_script_text(&thirty).is_ok());
        // Spaces do not count toward the limit.
        assert!(validate_script_text(&format!("{} ", thirty)).is_ok());

        let too_long = "x".repeat(MAX_SCRIPT_CHARS + 1);
        assert_eq!(
            validate_script_text(&too_long),
            Err(ScriptTextError::TooLong(MAX_SCRIPT_CHARS + 1))
        );
        assert_eq!(validate_script_text("   "), Err(ScriptTextError::Empty));
    }

    #[test]
    fn test_phoneme_duration() {
        let timing = PhonemeTiming {
            symbols: vec!["a".into(), "b".into()],
            start_times_seconds: vec![0.0, 1.5],
            durations_seconds: vec![1.0, 0.75],
        };
        assert_eq!(timing.total_duration(), Some(2.25));
        assert_eq!(PhonemeTiming::default().total_duration(), None);
    }

    #[test]
    fn test_character_kind_serializes_as_type() {
        let side = SideCharacter {
            name: "Owl".into(),
            kind: "bird".into(),
            description: String::new(),
        };
        let value = serde_json::to_value(&side).unwrap();
        assert_eq!(value["type"], "bird");
    }
}
