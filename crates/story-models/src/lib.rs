//! Shared data models for the story generation pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs, their lifecycle and the status payload returned to pollers
//! - Generation capabilities with their request payloads and results
//! - Story content (scenes, prompts, blueprint, narration)
//! - The story document mirrored to the project store

pub mod capability;
pub mod job;
pub mod project;
pub mod request;
pub mod result;
pub mod story;

// Re-export common types
pub use capability::{Capability, UnknownCapability};
pub use job::{JobId, JobProgress, JobRecord, JobState, JobStatus, JobTransitionError, SubmitResponse};
pub use project::{Project, ProjectSummary, SceneUpdate, StoryDocument};
pub use request::{
    CharacterImagesRequest, CharacterUploadRequest, FinalCutScene, FinalVideoRequest,
    ImagePromptsRequest, JobRequest, NarrationInput, NarrationsRequest, SceneImagesRequest,
    ScriptRequest, SideCharacterImagesRequest, SingleNarrationRequest, SingleSceneImageRequest,
    SingleVideoRequest, VideoPromptsRequest, VideosRequest,
};
pub use result::{
    batch_payload, decode_batch, CharacterOptionsResult, FinalVideoResult, ImagePromptsResult,
    NarrationResult, NarrationsResult, SceneImageResult, SceneImagesResult, ScriptResult,
    SideCharacterImagesResult, VideoPromptsResult, VideoResult, VideosResult,
};
pub use story::{
    script_char_count, validate_script_text, CharacterOption, CharacterProfile, ImagePrompt,
    Narration, PhonemeTiming, SceneType, ScriptScene, ScriptTextError, SideCharacter,
    SideCharacterImage, StoryInputs, VideoPrompt, VisualBlueprint, MAX_SCRIPT_CHARS,
};
