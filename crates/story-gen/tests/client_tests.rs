//! HTTP generation client tests against a mock service.

use std::time::Duration;

use serde_json::json;
use story_gen::{
    AspectRatio, GenClientConfig, GenError, GenerationBackend, HttpGenerationClient,
    TextToImageRequest, TextToSpeechRequest,
};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> HttpGenerationClient {
    HttpGenerationClient::new(GenClientConfig {
        base_url: server.uri(),
        timeout: Duration::from_secs(5),
        max_retries: 2,
        retry_base_delay: Duration::from_millis(1),
    })
    .expect("client builds")
}

fn image_request() -> TextToImageRequest {
    TextToImageRequest {
        prompt: "a quiet forest at dawn".into(),
        aspect_ratio: AspectRatio::Landscape,
    }
}

#[tokio::test]
async fn test_text_to_image_posts_prompt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/images/text-to-image"))
        .and(body_partial_json(json!({"aspect_ratio": "16:9"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"image_url": "https://cdn/forest.png"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let url = client(&server).text_to_image(&image_request()).await.unwrap();
    assert_eq!(url, "https://cdn/forest.png");
}

#[tokio::test]
async fn test_retries_service_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/images/text-to-image"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/images/text-to-image"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"image_url": "https://cdn/retry.png"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let url = client(&server).text_to_image(&image_request()).await.unwrap();
    assert_eq!(url, "https://cdn/retry.png");
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/images/text-to-image"))
        .respond_with(ResponseTemplate::new(400).set_body_string("prompt rejected"))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server)
        .text_to_image(&image_request())
        .await
        .unwrap_err();
    assert!(matches!(err, GenError::RequestFailed(ref msg) if msg.contains("prompt rejected")));
}

#[tokio::test]
async fn test_gives_up_after_max_retries() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/images/text-to-image"))
        .respond_with(ResponseTemplate::new(502))
        .expect(3)
        .mount(&server)
        .await;

    let err = client(&server)
        .text_to_image(&image_request())
        .await
        .unwrap_err();
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_empty_image_url_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/images/text-to-image"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"image_url": ""})))
        .mount(&server)
        .await;

    let err = client(&server)
        .text_to_image(&image_request())
        .await
        .unwrap_err();
    assert!(matches!(err, GenError::EmptyOutput(_)));
}

#[tokio::test]
async fn test_speech_with_phonemes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/speech"))
        .and(body_partial_json(json!({"language": "ko", "include_phonemes": true})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "audio_url": "https://cdn/n1.mp3",
            "phonemes": {
                "symbols": ["토", "끼"],
                "start_times_seconds": [0.0, 0.4],
                "durations_seconds": [0.4, 0.6]
            }
        })))
        .mount(&server)
        .await;

    let speech = client(&server)
        .text_to_speech(&TextToSpeechRequest {
            text: "토끼".into(),
            voice_id: None,
            language: "ko".into(),
            include_phonemes: true,
        })
        .await
        .unwrap();
    assert_eq!(speech.audio_url, "https://cdn/n1.mp3");
    assert_eq!(speech.resolved_duration(), 1.0);
}

#[tokio::test]
async fn test_health_check() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .mount(&server)
        .await;

    assert!(client(&server).health_check().await.unwrap());
}
