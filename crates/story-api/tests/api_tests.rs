//! API integration tests against in-memory state.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use story_api::{create_router, ApiConfig, AppState, MemoryProjectRepository};
use story_models::{Capability, JobId, JobRecord};
use story_queue::{JobStore, MemoryJobQueue, MemoryJobStore};

struct TestApp {
    router: Router,
    store: Arc<MemoryJobStore>,
    queue: Arc<MemoryJobQueue>,
}

fn test_app() -> TestApp {
    let store = Arc::new(MemoryJobStore::new());
    let queue = Arc::new(MemoryJobQueue::new());
    let state = AppState::from_parts(
        ApiConfig::default(),
        store.clone(),
        queue.clone(),
        Arc::new(MemoryProjectRepository::new()),
    );
    TestApp {
        router: create_router(state, None),
        store,
        queue,
    }
}

async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(match body {
            Some(v) => Body::from(v.to_string()),
            None => Body::empty(),
        })
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

fn narration_payload() -> Value {
    json!({"scenes": [
        {"scene_number": 1, "text": "토끼가 숲으로 갔어요"},
        {"scene_number": 2, "text": "부엉이를 만났어요"}
    ]})
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = test_app();
    let (status, body) = send(&app.router, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_submit_then_poll() {
    let app = test_app();

    let (status, body) = send(
        &app.router,
        "POST",
        "/api/jobs/generate_narrations",
        Some(narration_payload()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "PENDING");
    let job_id = body["job_id"].as_str().unwrap().to_string();

    for prefix in ["/api/job/", "/api/jobs/"] {
        let (status, body) = send(&app.router, "GET", &format!("{}{}", prefix, job_id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "PENDING");
        assert_eq!(body["job_id"], job_id.as_str());
        assert!(body.get("result").is_none());
    }
}

#[tokio::test]
async fn test_status_reflects_progress() {
    let app = test_app();
    let mut record = JobRecord::new(JobId::from_string("job-1"), Capability::GenerateSceneImages);
    record.start("Starting").unwrap();
    record
        .record_progress(2, 5, "Generated 2/5", Some(json!({"scene_images": [null, "b", null, "d", null]})))
        .unwrap();
    app.store.create(&record).await.unwrap();

    let (status, body) = send(&app.router, "GET", "/api/job/job-1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "PROGRESS");
    assert_eq!(body["progress"], json!({"current": 2, "total": 5}));
    assert_eq!(body["partial_results"]["scene_images"][3], "d");
}

#[tokio::test]
async fn test_unknown_job_is_404() {
    let app = test_app();
    let (status, body) = send(&app.router, "GET", "/api/job/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["detail"].as_str().unwrap().contains("nope"));
}

#[tokio::test]
async fn test_bad_submissions_are_400() {
    let app = test_app();

    let (status, _) = send(&app.router, "POST", "/api/jobs/generate_music", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app.router,
        "POST",
        "/api/jobs/generate_script",
        Some(json!({"style": "watercolor", "scene_count": 5})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let request = Request::builder()
        .method("POST")
        .uri("/api/jobs/generate_videos")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert_eq!(app.store.len().await, 0);
}

#[tokio::test]
async fn test_queue_down_is_503_without_job() {
    let app = test_app();
    app.queue.close();

    let (status, body) = send(
        &app.router,
        "POST",
        "/api/jobs/generate_narrations",
        Some(narration_payload()),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body.get("job_id").is_none());
    assert_eq!(app.store.len().await, 0);

    let (status, body) = send(&app.router, "GET", "/ready", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["checks"]["queue"]["status"], "error");
}

#[tokio::test]
async fn test_project_lifecycle() {
    let app = test_app();

    let document = json!({
        "title": "Moon Rabbit",
        "scenes": [
            {"scene_number": 1, "scene_type": "character", "script_text": "달토끼가 깼어요"},
            {"scene_number": 2, "scene_type": "scenery", "script_text": "달이 떴어요"}
        ],
        "video_urls": ["https://video/1.mp4"]
    });
    let (status, project) = send(&app.router, "POST", "/api/projects", Some(document)).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = project["id"].as_str().unwrap().to_string();
    // Sibling collections are aligned on the way in.
    assert_eq!(project["document"]["video_urls"], json!(["https://video/1.mp4", null]));

    let (status, list) = send(&app.router, "GET", "/api/projects", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list[0]["title"], "Moon Rabbit");
    assert_eq!(list[0]["scene_count"], 2);

    let (status, updated) = send(
        &app.router,
        "PUT",
        &format!("/api/projects/{}/scenes/2", id),
        Some(json!({"video_url": "https://video/2.mp4"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["document"]["video_urls"][1], "https://video/2.mp4");
    assert_eq!(updated["document"]["video_urls"][0], "https://video/1.mp4");

    let (status, _) = send(
        &app.router,
        "PUT",
        &format!("/api/projects/{}/scenes/9", id),
        Some(json!({"video_url": "x"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app.router, "DELETE", &format!("/api/projects/{}", id), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app.router, "GET", &format!("/api/projects/{}", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_security_and_request_id_headers() {
    let app = test_app();
    let request = Request::builder()
        .uri("/health")
        .header("X-Request-ID", "req-42")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.headers()["x-request-id"], "req-42");
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
}
