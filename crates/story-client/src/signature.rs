//! Fingerprint of the inputs every generated artifact derives from.

use serde_json::json;
use sha2::{Digest, Sha256};

use story_models::StoryInputs;

/// SHA-256 hex digest over character identity, style, themes, custom theme
/// and scene count. The narration voice is not included.
pub fn input_signature(inputs: &StoryInputs) -> String {
    let character = &inputs.character;
    let canonical = json!({
        "character": {
            "name": character.name,
            "type": character.kind,
            "personality": character.personality,
            "description": character.description,
            "image_url": character.image_url,
        },
        "style": inputs.style,
        "themes": inputs.themes,
        "custom_theme": inputs.custom_theme,
        "scene_count": inputs.scene_count,
    });
    let digest = Sha256::digest(canonical.to_string().as_bytes());
    format!("{:x}", digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs() -> StoryInputs {
        let mut inputs = StoryInputs {
            style: "watercolor".into(),
            themes: vec!["friendship".into()],
            scene_count: 5,
            ..Default::default()
        };
        inputs.character.name = "Bori".into();
        inputs.character.image_url = Some("https://cdn/bori.png".into());
        inputs
    }

    #[test]
    fn test_signature_is_stable_hex() {
        let sig = input_signature(&inputs());
        assert_eq!(sig.len(), 64);
        assert_eq!(sig, input_signature(&inputs()));
    }

    #[test]
    fn test_signature_tracks_relevant_inputs_only() {
        let base = input_signature(&inputs());

        let mut voice = inputs();
        voice.narration_voice = Some("voice-2".into());
        assert_eq!(input_signature(&voice), base);

        let mut count = inputs();
        count.scene_count = 6;
        assert_ne!(input_signature(&count), base);

        let mut image = inputs();
        image.character.image_url = Some("https://cdn/other.png".into());
        assert_ne!(input_signature(&image), base);
    }
}
