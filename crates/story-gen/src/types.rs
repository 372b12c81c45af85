//! Generation service request/response types.

use serde::{Deserialize, Serialize};
use story_models::{PhonemeTiming, SideCharacter};

/// Output aspect ratio for generated images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AspectRatio {
    #[serde(rename = "1:1")]
    Square,
    #[default]
    #[serde(rename = "16:9")]
    Landscape,
    #[serde(rename = "9:16")]
    Portrait,
}

/// Main character prompt from a free-text description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterPromptRequest {
    pub description: String,
    pub style: String,
}

/// Prompts that restyle an uploaded image, one per variation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StyleConversionRequest {
    pub image_url: String,
    pub style: String,
    #[serde(default)]
    pub description: String,
    pub count: u32,
}

/// Portrait prompt for a side character, matched to the main character's look.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SideCharacterPromptRequest {
    pub side_character: SideCharacter,
    pub style: String,
    #[serde(default)]
    pub main_character_prompt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextToImageRequest {
    pub prompt: String,
    #[serde(default)]
    pub aspect_ratio: AspectRatio,
}

/// Image generation guided by one or more reference images.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageToImageRequest {
    pub prompt: String,
    pub reference_images: Vec<String>,
    #[serde(default)]
    pub aspect_ratio: AspectRatio,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageToVideoRequest {
    pub image_url: String,
    pub prompt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextToSpeechRequest {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
    pub language: String,
    pub include_phonemes: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptResponse {
    pub prompt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptsResponse {
    pub prompts: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageResponse {
    pub image_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoResponse {
    pub video_url: String,
}

/// Synthesized speech. `duration` may be absent when the service only
/// returns phoneme timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechResponse {
    pub audio_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phonemes: Option<PhonemeTiming>,
}

impl SpeechResponse {
    /// Audio length: reported duration, else the end of the last phoneme.
    pub fn resolved_duration(&self) -> f64 {
        self.duration
            .or_else(|| self.phonemes.as_ref().and_then(PhonemeTiming::total_duration))
            .unwrap_or(0.0)
    }
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aspect_ratio_wire_names() {
        assert_eq!(serde_json::to_value(AspectRatio::Square).unwrap(), "1:1");
        assert_eq!(serde_json::to_value(AspectRatio::default()).unwrap(), "16:9");
    }

    #[test]
    fn test_speech_duration_falls_back_to_phonemes() {
        let speech = SpeechResponse {
            audio_url: "a.mp3".into(),
            duration: None,
            phonemes: Some(PhonemeTiming {
                symbols: vec!["a".into()],
                start_times_seconds: vec![1.25],
                durations_seconds: vec![0.5],
            }),
        };
        assert_eq!(speech.resolved_duration(), 1.75);

        let reported = SpeechResponse {
            duration: Some(3.0),
            ..speech
        };
        assert_eq!(reported.resolved_duration(), 3.0);
    }
}
