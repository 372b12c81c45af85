//! Client for the external generation service.
//!
//! The executors only see [`GenerationBackend`]; [`HttpGenerationClient`] is
//! the production implementation talking JSON over HTTP.

pub mod backend;
pub mod client;
pub mod error;
pub mod types;

pub use backend::GenerationBackend;
pub use client::{GenClientConfig, HttpGenerationClient};
pub use error::{GenError, GenResult};
pub use types::{
    AspectRatio, CharacterPromptRequest, ImageToImageRequest, ImageToVideoRequest,
    SideCharacterPromptRequest, SpeechResponse, StyleConversionRequest, TextToImageRequest,
    TextToSpeechRequest,
};
