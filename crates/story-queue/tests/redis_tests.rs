//! Redis-backed store and queue integration tests.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use story_models::{Capability, JobId, JobRecord, JobRequest, JobState};
use story_queue::{JobQueue, JobReporter, JobStore, QueueConfig, QueuedJob, RedisJobQueue, RedisJobStore};

fn request() -> JobRequest {
    JobRequest::from_parts(
        Capability::GenerateSingleNarration,
        json!({"scene_number": 1, "text": "토끼가 숲에 갔어요"}),
    )
    .expect("valid request")
}

/// Test Redis connection and basic operations.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_redis_connection() {
    dotenvy::dotenv().ok();

    let queue = RedisJobQueue::from_env().expect("Failed to create queue");
    queue.init().await.expect("Failed to initialize queue");
    queue.ping().await.expect("Failed to ping");

    let len = queue.len().await.expect("Failed to get queue length");
    println!("Queue length: {}", len);
}

/// Test job enqueue, consume and ack cycle.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_job_enqueue_consume_ack() {
    dotenvy::dotenv().ok();

    let queue = RedisJobQueue::from_env().expect("Failed to create queue");
    queue.init().await.expect("Failed to initialize queue");

    let job = QueuedJob::new(JobId::new(), request());
    let message_id = queue.enqueue(&job).await.expect("Failed to enqueue");
    println!("Enqueued job {} with message ID {}", job.job_id, message_id);

    let deliveries = queue
        .consume("test-consumer", Duration::from_millis(1000), 1)
        .await
        .expect("Failed to consume");

    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].job.job_id, job.job_id);

    queue
        .ack(&deliveries[0].delivery_id)
        .await
        .expect("Failed to ack");
}

/// Test the reporter writing through to the Redis job store.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_reporter_against_redis_store() {
    dotenvy::dotenv().ok();

    let store: Arc<dyn JobStore> =
        Arc::new(RedisJobStore::new(&QueueConfig::from_env()).expect("Failed to create store"));
    let record = JobRecord::new(JobId::new(), Capability::GenerateVideos);
    store.create(&record).await.expect("Failed to create record");

    let mut reporter = JobReporter::load(store.clone(), &record.job_id)
        .await
        .expect("Failed to load record");
    reporter.started("Starting").await.expect("start");
    reporter
        .progress(1, 2, "1/2", Some(json!({"videos": ["v1", null]})))
        .await
        .expect("progress");

    let stored = store
        .get(&record.job_id)
        .await
        .expect("get")
        .expect("record exists");
    assert_eq!(stored.state, JobState::Progress);
    assert_eq!(stored.partial_results, Some(json!({"videos": ["v1", null]})));

    store.delete(&record.job_id).await.expect("delete");
}
