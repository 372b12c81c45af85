//! Capability result payloads and the index-aligned batch shape.
//!
//! Fan-out capabilities publish `{ <batch_key>: [item | null, ...] }` both as
//! `partial_results` while running and as the final `result`.

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::story::{
    CharacterOption, ImagePrompt, Narration, ScriptScene, SideCharacterImage, VideoPrompt,
    VisualBlueprint,
};

/// Build a batch payload, `None` entries become `null`.
pub fn batch_payload<T: Serialize>(key: &str, items: &[Option<T>]) -> Value {
    let entries = items
        .iter()
        .map(|item| match item {
            Some(item) => serde_json::to_value(item).unwrap_or(Value::Null),
            None => Value::Null,
        })
        .collect();
    let mut map = Map::new();
    map.insert(key.to_string(), Value::Array(entries));
    Value::Object(map)
}

/// Decode the entries published under `key`.
///
/// Returns `None` when the key is missing or not an array. Entries that are
/// `null` or do not decode as `T` come back as `None`.
pub fn decode_batch<T: DeserializeOwned>(value: &Value, key: &str) -> Option<Vec<Option<T>>> {
    let entries = value.get(key)?.as_array()?;
    Some(
        entries
            .iter()
            .map(|entry| match entry {
                Value::Null => None,
                other => serde_json::from_value(other.clone()).ok(),
            })
            .collect(),
    )
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptResult {
    pub title: String,
    pub scenes: Vec<ScriptScene>,
    #[serde(default)]
    pub blueprint: VisualBlueprint,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CharacterOptionsResult {
    pub character_options: Vec<CharacterOption>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SideCharacterImagesResult {
    pub character_images: Vec<SideCharacterImage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ImagePromptsResult {
    pub image_prompts: Vec<ImagePrompt>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SceneImagesResult {
    pub scene_images: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SceneImageResult {
    pub scene_number: u32,
    pub image_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct VideoPromptsResult {
    pub video_prompts: Vec<VideoPrompt>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct VideosResult {
    pub videos: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct VideoResult {
    pub scene_number: u32,
    pub video_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NarrationsResult {
    pub narrations: Vec<Narration>,
}

/// A regenerated narration for one scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NarrationResult {
    pub scene_number: u32,
    #[serde(flatten)]
    pub narration: Narration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FinalVideoResult {
    pub final_video_url: String,
    /// Total length in seconds
    pub duration: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_batch_payload_marks_missing_entries_null() {
        let items = vec![Some("a".to_string()), None, Some("c".to_string())];
        assert_eq!(
            batch_payload("scene_images", &items),
            json!({"scene_images": ["a", null, "c"]})
        );
    }

    #[test]
    fn test_decode_batch() {
        let value = json!({"videos": ["v1", null, 7]});
        let decoded: Vec<Option<String>> = decode_batch(&value, "videos").unwrap();
        assert_eq!(decoded, vec![Some("v1".to_string()), None, None]);

        assert!(decode_batch::<String>(&value, "scene_images").is_none());
        assert!(decode_batch::<String>(&json!({"videos": "v1"}), "videos").is_none());
    }

    #[test]
    fn test_narration_result_is_flat() {
        let value = json!({"scene_number": 3, "url": "https://a/3.mp3", "duration": 2.5});
        let result: NarrationResult = serde_json::from_value(value).unwrap();
        assert_eq!(result.scene_number, 3);
        assert_eq!(result.narration.url, "https://a/3.mp3");
        assert!(result.narration.phonemes.is_none());
    }
}
