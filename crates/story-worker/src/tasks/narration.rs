use story_gen::{SpeechResponse, TextToSpeechRequest};
use story_models::{
    Narration, NarrationResult, NarrationsRequest, NarrationsResult, SingleNarrationRequest,
};
use story_queue::JobReporter;

use super::TaskContext;
use crate::error::WorkerResult;
use crate::fanout::FanOut;

fn to_narration(speech: SpeechResponse, include_phonemes: bool) -> Narration {
    let duration = speech.resolved_duration();
    Narration {
        url: speech.audio_url,
        duration,
        phonemes: if include_phonemes { speech.phonemes } else { None },
    }
}

pub(super) async fn narrations(
    ctx: &TaskContext<'_>,
    reporter: &mut JobReporter,
    request: &NarrationsRequest,
) -> WorkerResult<NarrationsResult> {
    let fanout = FanOut {
        key: "narrations",
        label: "narration",
        max_concurrency: ctx.config.max_fanout,
    };
    let narrations = fanout
        .run(reporter, ctx.logger, request.scenes.iter().collect(), |_, scene| async move {
            let speech = ctx
                .backend
                .text_to_speech(&TextToSpeechRequest {
                    text: scene.text.clone(),
                    voice_id: request.voice_id.clone(),
                    language: request.language.clone(),
                    include_phonemes: request.include_phonemes,
                })
                .await?;
            Ok(to_narration(speech, request.include_phonemes))
        })
        .await?;

    Ok(NarrationsResult { narrations })
}

pub(super) async fn single_narration(
    ctx: &TaskContext<'_>,
    request: &SingleNarrationRequest,
) -> WorkerResult<NarrationResult> {
    let speech = ctx
        .backend
        .text_to_speech(&TextToSpeechRequest {
            text: request.text.clone(),
            voice_id: request.voice_id.clone(),
            language: request.language.clone(),
            include_phonemes: request.include_phonemes,
        })
        .await?;

    Ok(NarrationResult {
        scene_number: request.scene_number,
        narration: to_narration(speech, request.include_phonemes),
    })
}
