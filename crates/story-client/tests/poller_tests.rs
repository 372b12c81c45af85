//! Poller behavior against a scripted status sequence and a manual clock.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use story_client::{
    ClientError, ClientResult, JobApi, ManualClock, PollHandle, Poller, PollerConfig,
    ProgressUpdate,
};
use story_models::{
    Capability, JobId, JobProgress, JobRequest, JobState, JobStatus, SubmitResponse,
};

const INTERVAL: Duration = Duration::from_secs(2);

#[derive(Default)]
struct ScriptedApi {
    statuses: Mutex<VecDeque<ClientResult<JobStatus>>>,
    reads: AtomicUsize,
    /// When set, each read signals `entered` and waits for `release`
    hold: Option<(Arc<Notify>, Arc<Notify>)>,
}

impl ScriptedApi {
    fn new(statuses: Vec<ClientResult<JobStatus>>) -> Self {
        Self {
            statuses: Mutex::new(statuses.into()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl JobApi for ScriptedApi {
    async fn submit(&self, request: &JobRequest) -> ClientResult<SubmitResponse> {
        Ok(SubmitResponse::pending(
            JobId::from_string("job-1"),
            request.capability(),
        ))
    }

    async fn get_status(&self, _job_id: &JobId) -> ClientResult<JobStatus> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if let Some((entered, release)) = &self.hold {
            entered.notify_one();
            release.notified().await;
        }
        self.statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ClientError::transport("no scripted status left")))
    }
}

fn status(state: JobState) -> JobStatus {
    JobStatus {
        job_id: JobId::from_string("job-1"),
        state,
        status: state.to_string(),
        progress: None,
        partial_results: None,
        result: None,
        error: None,
    }
}

fn progress(current: u32, total: u32, partial: Value) -> JobStatus {
    JobStatus {
        progress: Some(JobProgress::new(current, total)),
        partial_results: Some(partial),
        ..status(JobState::Progress)
    }
}

fn succeeded(result: Value) -> JobStatus {
    JobStatus {
        result: Some(result),
        ..status(JobState::Success)
    }
}

fn failed(error: &str) -> JobStatus {
    JobStatus {
        error: Some(error.to_string()),
        ..status(JobState::Failure)
    }
}

struct Run {
    clock: ManualClock,
    api: Arc<ScriptedApi>,
    handle: PollHandle,
    updates: Arc<Mutex<Vec<ProgressUpdate>>>,
    task: JoinHandle<ClientResult<Value>>,
}

fn start(api: ScriptedApi) -> Run {
    let clock = ManualClock::new();
    let api = Arc::new(api);
    let poller = Poller::new(
        api.clone(),
        Arc::new(clock.clone()),
        PollerConfig { interval: INTERVAL },
    );
    let handle = PollHandle::new();
    let updates = Arc::new(Mutex::new(Vec::new()));

    let task = tokio::spawn({
        let handle = handle.clone();
        let updates = updates.clone();
        async move {
            poller
                .poll(&JobId::from_string("job-1"), &handle, move |update| {
                    updates.lock().unwrap().push(update)
                })
                .await
        }
    });

    Run {
        clock,
        api,
        handle,
        updates,
        task,
    }
}

impl Run {
    /// Let one interval pass once the poller is waiting on it.
    async fn tick(&self) {
        self.clock.wait_for_sleepers(1).await;
        self.clock.advance(INTERVAL);
    }

    async fn ticks(&self, n: usize) {
        for _ in 0..n {
            self.tick().await;
        }
    }

    async fn outcome(&mut self) -> ClientResult<Value> {
        (&mut self.task).await.unwrap()
    }

    fn updates(&self) -> Vec<ProgressUpdate> {
        self.updates.lock().unwrap().clone()
    }
}

#[tokio::test]
async fn test_progress_reports_partial_results_until_success() {
    let mut run = start(ScriptedApi::new(vec![
        Ok(status(JobState::Pending)),
        Ok(status(JobState::Started)),
        Ok(progress(
            2,
            5,
            json!({"scene_images": [null, "b.png", null, "d.png", null]}),
        )),
        Ok(progress(
            4,
            5,
            json!({"scene_images": ["a.png", "b.png", null, "d.png", "e.png"]}),
        )),
        Ok(succeeded(json!({"scene_images": ["a", "b", "c", "d", "e"]}))),
    ]));

    run.ticks(5).await;
    let result = run.outcome().await.unwrap();
    assert_eq!(result["scene_images"][2], "c");

    // Pending and a started status without progress produce no callback.
    let updates = run.updates();
    assert_eq!(updates.len(), 2);
    assert_eq!((updates[0].current, updates[0].total), (2, 5));
    assert_eq!(
        updates[0].partial_results,
        Some(json!({"scene_images": [null, "b.png", null, "d.png", null]}))
    );

    let populated = |u: &ProgressUpdate| {
        u.partial_results.as_ref().unwrap()["scene_images"]
            .as_array()
            .unwrap()
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.is_null())
            .map(|(i, _)| i)
            .collect::<Vec<_>>()
    };
    assert!(updates.windows(2).all(|w| w[0].current <= w[1].current));
    let first = populated(&updates[0]);
    let second = populated(&updates[1]);
    assert_eq!(first, vec![1, 3]);
    assert!(first.iter().all(|i| second.contains(i)));
}

#[tokio::test]
async fn test_failure_rejects_with_job_error() {
    let mut run = start(ScriptedApi::new(vec![
        Ok(progress(1, 4, json!({"videos": ["v1", null, null, null]}))),
        Ok(failed("Item 3 of 4 failed: upstream timeout")),
    ]));

    run.ticks(2).await;
    match run.outcome().await {
        Err(ClientError::JobFailed(error)) => assert!(error.contains("Item 3 of 4")),
        other => panic!("expected job failure, got {:?}", other),
    }
    assert_eq!(run.updates().len(), 1);
}

#[tokio::test]
async fn test_transport_error_is_not_retried() {
    let mut run = start(ScriptedApi::new(vec![
        Ok(status(JobState::Pending)),
        Err(ClientError::transport("connection reset")),
        Ok(succeeded(Value::Null)),
    ]));

    run.ticks(2).await;
    assert!(matches!(
        run.outcome().await,
        Err(ClientError::Transport(_))
    ));
    assert_eq!(run.api.reads.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let mut run = start(ScriptedApi::new(vec![Err(ClientError::NotFound(
        "job job-1".into(),
    ))]));

    run.tick().await;
    let err = run.outcome().await.unwrap_err();
    assert!(matches!(err, ClientError::NotFound(_)));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_cancel_before_tick_stops_without_reading() {
    let mut run = start(ScriptedApi::new(vec![Ok(status(JobState::Pending))]));

    run.clock.wait_for_sleepers(1).await;
    run.handle.cancel();

    assert!(matches!(run.outcome().await, Err(ClientError::Cancelled)));
    assert_eq!(run.api.reads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cancel_discards_in_flight_read() {
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let mut api = ScriptedApi::new(vec![Ok(progress(3, 3, json!({"videos": ["a", "b", "c"]})))]);
    api.hold = Some((entered.clone(), release.clone()));
    let mut run = start(api);

    run.tick().await;
    entered.notified().await;
    run.handle.cancel();
    release.notify_one();

    assert!(matches!(run.outcome().await, Err(ClientError::Cancelled)));
    assert!(run.updates().is_empty());
}

#[tokio::test]
async fn test_submit_and_poll_follows_the_submitted_job() {
    let clock = ManualClock::new();
    let api = Arc::new(ScriptedApi::new(vec![Ok(succeeded(
        json!({"final_video_url": "f.mp4", "duration": 9.0}),
    ))]));
    let poller = Poller::new(
        api.clone(),
        Arc::new(clock.clone()),
        PollerConfig { interval: INTERVAL },
    );
    let request = JobRequest::from_parts(
        Capability::GenerateSingleVideo,
        json!({"scene_number": 1, "image_url": "https://a/1.png", "video_prompt": "pan"}),
    )
    .unwrap();

    let task = tokio::spawn(async move {
        poller
            .submit_and_poll(&request, &PollHandle::new(), |_| {})
            .await
    });
    clock.wait_for_sleepers(1).await;
    clock.advance(INTERVAL);

    let result = task.await.unwrap().unwrap();
    assert_eq!(result["final_video_url"], "f.mp4");
    assert_eq!(clock.now(), INTERVAL);
}
