//! The story document and the project records that mirror it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::story::{
    CharacterOption, ImagePrompt, Narration, SceneType, ScriptScene, SideCharacterImage,
    StoryInputs, VideoPrompt, VisualBlueprint,
};

/// The canonical, index-aligned story being assembled.
///
/// Every per-scene collection has the same length as `scenes` and entry `i`
/// belongs to scene `i + 1`. `None` marks an artifact that is not ready.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StoryDocument {
    #[serde(default)]
    pub inputs: StoryInputs,
    /// Signature of `inputs` the downstream artifacts were produced from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_signature: Option<String>,
    #[serde(default)]
    pub character_options: Vec<CharacterOption>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub scenes: Vec<ScriptScene>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blueprint: Option<VisualBlueprint>,
    #[serde(default)]
    pub side_character_images: Vec<SideCharacterImage>,
    #[serde(default)]
    pub image_prompts: Vec<Option<ImagePrompt>>,
    #[serde(default)]
    pub video_prompts: Vec<Option<VideoPrompt>>,
    #[serde(default)]
    pub image_urls: Vec<Option<String>>,
    #[serde(default)]
    pub video_urls: Vec<Option<String>>,
    #[serde(default)]
    pub narrations: Vec<Option<Narration>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_video_url: Option<String>,
}

fn fit<T>(items: &mut Vec<Option<T>>, len: usize) {
    items.resize_with(len, || None);
}

impl StoryDocument {
    pub fn scene_count(&self) -> usize {
        self.scenes.len()
    }

    /// Whether every per-scene collection matches the scene list length.
    pub fn is_aligned(&self) -> bool {
        let n = self.scenes.len();
        self.image_prompts.len() == n
            && self.video_prompts.len() == n
            && self.image_urls.len() == n
            && self.video_urls.len() == n
            && self.narrations.len() == n
    }

    /// Pad or truncate every sibling collection to the scene list length.
    ///
    /// Values at indices that exist on both sides are kept.
    pub fn align_to_scenes(&mut self) {
        let n = self.scenes.len();
        fit(&mut self.image_prompts, n);
        fit(&mut self.video_prompts, n);
        fit(&mut self.image_urls, n);
        fit(&mut self.video_urls, n);
        fit(&mut self.narrations, n);
    }

    /// Change the number of scenes. New scenes get empty placeholders,
    /// existing scenes keep their number and every artifact.
    pub fn resize_scenes(&mut self, count: usize) {
        if count < self.scenes.len() {
            self.scenes.truncate(count);
        } else {
            let start = self.scenes.len();
            self.scenes
                .extend((start..count).map(|i| ScriptScene::placeholder(i as u32 + 1)));
        }
        self.align_to_scenes();
    }

    /// Drop every artifact derived from the inputs.
    pub fn clear_downstream(&mut self) {
        self.title.clear();
        self.scenes.clear();
        self.blueprint = None;
        self.side_character_images.clear();
        self.image_prompts.clear();
        self.video_prompts.clear();
        self.image_urls.clear();
        self.video_urls.clear();
        self.narrations.clear();
        self.final_video_url = None;
    }

    /// Zero-based slot of a 1-based scene number, if that scene exists.
    pub fn scene_index(&self, scene_number: u32) -> Option<usize> {
        let index = (scene_number as usize).checked_sub(1)?;
        (index < self.scenes.len()).then_some(index)
    }

    pub fn has_video(&self, index: usize) -> bool {
        matches!(self.video_urls.get(index), Some(Some(url)) if !url.is_empty())
    }

    pub fn has_narration(&self, index: usize) -> bool {
        matches!(self.narrations.get(index), Some(Some(n)) if !n.url.is_empty())
    }

    /// Apply an edit to a single scene. Returns `false` for an unknown scene.
    pub fn apply_scene_update(&mut self, scene_number: u32, update: &SceneUpdate) -> bool {
        self.align_to_scenes();
        let Some(index) = self.scene_index(scene_number) else {
            return false;
        };
        if let Some(text) = &update.script_text {
            self.scenes[index].script_text = text.clone();
        }
        if let Some(scene_type) = update.scene_type {
            self.scenes[index].scene_type = scene_type;
        }
        if let Some(prompt) = &update.image_prompt {
            self.image_prompts[index] = Some(prompt.clone());
        }
        if let Some(prompt) = &update.video_prompt {
            self.video_prompts[index] = Some(prompt.clone());
        }
        if let Some(url) = &update.image_url {
            self.image_urls[index] = Some(url.clone());
        }
        if let Some(url) = &update.video_url {
            self.video_urls[index] = Some(url.clone());
        }
        if let Some(narration) = &update.narration {
            self.narrations[index] = Some(narration.clone());
        }
        true
    }
}

/// Partial edit of one scene's sub-record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SceneUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene_type: Option<SceneType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_prompt: Option<ImagePrompt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_prompt: Option<VideoPrompt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narration: Option<Narration>,
}

/// A saved story in the project store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub document: StoryDocument,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn new(document: StoryDocument) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            document,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn summary(&self) -> ProjectSummary {
        ProjectSummary {
            id: self.id.clone(),
            title: self.document.title.clone(),
            scene_count: self.document.scene_count(),
            has_final_video: self.document.final_video_url.is_some(),
            updated_at: self.updated_at,
        }
    }
}

/// Listing entry for a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub id: String,
    pub title: String,
    pub scene_count: usize,
    pub has_final_video: bool,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document(scenes: usize) -> StoryDocument {
        let mut doc = StoryDocument::default();
        doc.resize_scenes(scenes);
        doc
    }

    #[test]
    fn test_resize_preserves_existing_entries() {
        let mut doc = document(5);
        for i in 0..3 {
            doc.video_urls[i] = Some(format!("v{i}"));
        }

        doc.resize_scenes(6);
        assert!(doc.is_aligned());
        assert_eq!(doc.video_urls.len(), 6);
        assert_eq!(doc.video_urls[2].as_deref(), Some("v2"));
        assert!(doc.video_urls[3..].iter().all(Option::is_none));
        assert_eq!(doc.scenes[5].scene_number, 6);

        doc.resize_scenes(2);
        assert!(doc.is_aligned());
        assert_eq!(doc.video_urls, vec![Some("v0".into()), Some("v1".into())]);
    }

    #[test]
    fn test_align_pads_short_siblings() {
        let mut doc = document(4);
        doc.video_urls = vec![Some("a".into())];
        doc.narrations.push(None);
        assert!(!doc.is_aligned());

        doc.align_to_scenes();
        assert!(doc.is_aligned());
        assert_eq!(doc.video_urls[0].as_deref(), Some("a"));
    }

    #[test]
    fn test_scene_update_targets_one_scene() {
        let mut doc = document(3);
        let update = SceneUpdate {
            script_text: Some("새 대사".into()),
            image_url: Some("https://img/2.png".into()),
            ..Default::default()
        };
        assert!(doc.apply_scene_update(2, &update));
        assert_eq!(doc.scenes[1].script_text, "새 대사");
        assert_eq!(doc.image_urls[1].as_deref(), Some("https://img/2.png"));
        assert!(doc.image_urls[0].is_none());

        assert!(!doc.apply_scene_update(0, &update));
        assert!(!doc.apply_scene_update(4, &update));
    }

    #[test]
    fn test_clear_downstream_keeps_inputs() {
        let mut doc = document(2);
        doc.inputs.style = "watercolor".into();
        doc.title = "Bori".into();
        doc.final_video_url = Some("final.mp4".into());

        doc.clear_downstream();
        assert_eq!(doc.inputs.style, "watercolor");
        assert!(doc.scenes.is_empty() && doc.final_video_url.is_none());
        assert!(doc.is_aligned());
    }
}
