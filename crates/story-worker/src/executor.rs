//! Job executor.

use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, gauge, histogram};
use tokio::sync::{watch, Mutex, Semaphore};
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use story_gen::GenerationBackend;
use story_models::JobId;
use story_queue::{Delivery, JobQueue, JobReporter, JobStore, QueueResult, QueuedJob};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::retry::{ConsumeBackoff, StoreRetry};
use crate::tasks::{self, TaskContext};

/// Builds a fresh generation backend.
pub type BackendFactory =
    Arc<dyn Fn() -> WorkerResult<Arc<dyn GenerationBackend>> + Send + Sync>;

struct BackendSlot {
    backend: Arc<dyn GenerationBackend>,
    served: u32,
}

/// Hands out the current backend and replaces it after a fixed number of jobs.
///
/// Jobs already holding the old backend keep it until they finish.
struct BackendPool {
    factory: BackendFactory,
    max_tasks: u32,
    slot: Mutex<BackendSlot>,
}

impl BackendPool {
    fn new(factory: BackendFactory, max_tasks: u32) -> WorkerResult<Self> {
        let backend = factory()?;
        Ok(Self {
            factory,
            max_tasks: max_tasks.max(1),
            slot: Mutex::new(BackendSlot { backend, served: 0 }),
        })
    }

    async fn checkout(&self) -> WorkerResult<Arc<dyn GenerationBackend>> {
        let mut slot = self.slot.lock().await;
        if slot.served >= self.max_tasks {
            slot.backend = (self.factory)()?;
            slot.served = 0;
            counter!("story_backend_rotations_total").increment(1);
            info!("Rotated generation backend after {} jobs", self.max_tasks);
        }
        slot.served += 1;
        Ok(Arc::clone(&slot.backend))
    }
}

/// Shared by every job the executor runs.
struct ExecutionContext {
    config: WorkerConfig,
    queue: Arc<dyn JobQueue>,
    store: Arc<dyn JobStore>,
    backends: BackendPool,
}

/// Job executor that runs jobs from the queue in a bounded number of slots.
pub struct JobExecutor {
    ctx: Arc<ExecutionContext>,
    job_semaphore: Arc<Semaphore>,
    shutdown: watch::Sender<bool>,
    consumer_name: String,
}

impl JobExecutor {
    /// Create a new job executor. The first backend is built immediately.
    pub fn new(
        config: WorkerConfig,
        queue: Arc<dyn JobQueue>,
        store: Arc<dyn JobStore>,
        factory: BackendFactory,
    ) -> WorkerResult<Self> {
        if config.max_concurrent_jobs == 0 {
            return Err(WorkerError::config_error("max_concurrent_jobs must be at least 1"));
        }
        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        let (shutdown, _) = watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());
        let backends = BackendPool::new(factory, config.max_tasks_per_backend)?;

        Ok(Self {
            ctx: Arc::new(ExecutionContext {
                config,
                queue,
                store,
                backends,
            }),
            job_semaphore,
            shutdown,
            consumer_name,
        })
    }

    pub fn consumer_name(&self) -> &str {
        &self.consumer_name
    }

    /// Consume and run jobs until [`shutdown`](Self::shutdown) is called, then
    /// wait for in-flight jobs up to the shutdown timeout.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting job executor '{}' with {} max concurrent jobs",
            self.consumer_name, self.ctx.config.max_concurrent_jobs
        );

        let mut shutdown_rx = self.shutdown.subscribe();
        let mut backoff = ConsumeBackoff::new(3, Duration::from_secs(1), Duration::from_secs(10));

        loop {
            if *shutdown_rx.borrow() {
                break;
            }
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_jobs() => {
                    match result {
                        Ok(()) => backoff.succeeded(),
                        Err(e) => {
                            let (pause, log) = backoff.failed(e.is_retryable());
                            if log {
                                error!("Error consuming jobs: {}", e);
                            }
                            tokio::time::sleep(pause).await;
                        }
                    }
                }
            }
        }

        info!("Waiting for in-flight jobs to complete...");
        if tokio::time::timeout(self.ctx.config.shutdown_timeout, self.wait_for_jobs())
            .await
            .is_err()
        {
            warn!(
                "Shutdown timeout reached with {} jobs still running",
                self.in_flight()
            );
        }

        info!("Job executor stopped");
        Ok(())
    }

    /// Consume up to the number of free slots and spawn one task per job.
    async fn consume_jobs(&self) -> WorkerResult<()> {
        let available = self.job_semaphore.available_permits();
        if available == 0 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            return Ok(());
        }

        let deliveries = self
            .ctx
            .queue
            .consume(&self.consumer_name, self.ctx.config.consume_block, available)
            .await?;

        if deliveries.is_empty() {
            return Ok(());
        }

        debug!("Consumed {} jobs from queue", deliveries.len());

        for delivery in deliveries {
            let ctx = Arc::clone(&self.ctx);
            let permit = self
                .job_semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::job_failed("Semaphore closed"))?;

            tokio::spawn(async move {
                let _permit = permit;
                Self::execute_job(ctx, delivery).await;
            });
        }

        Ok(())
    }

    /// Run one job under the time limit, record its outcome and ack it.
    async fn execute_job(ctx: Arc<ExecutionContext>, delivery: Delivery) {
        let Delivery { delivery_id, job } = delivery;
        let job_id = job.job_id.clone();
        let capability = job.request.capability();
        let logger = JobLogger::new(&job_id, capability);
        let started = Instant::now();

        gauge!("story_jobs_in_flight").increment(1.0);
        counter!("story_jobs_started_total", "capability" => capability.as_str()).increment(1);

        let span = logger.create_span();
        let mut handle = tokio::spawn(
            Self::run_job(Arc::clone(&ctx), job, logger.clone()).instrument(span),
        );

        let limit = ctx.config.task_time_limit;
        let outcome = match tokio::time::timeout(limit, &mut handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) if join_error.is_panic() => Err(WorkerError::job_failed(format!(
                "Job panicked: {}",
                panic_message(join_error.into_panic())
            ))),
            Ok(Err(join_error)) => Err(WorkerError::job_failed(format!(
                "Job task was cancelled: {}",
                join_error
            ))),
            Err(_) => {
                handle.abort();
                let _ = handle.await;
                Err(WorkerError::TimeLimitExceeded(limit))
            }
        };

        let result_label = match &outcome {
            Ok(()) => "success",
            Err(e) => {
                logger.log_error(&e.to_string());
                Self::record_failure(&ctx.store, &job_id, &e.to_string()).await;
                "failure"
            }
        };

        counter!(
            "story_jobs_finished_total",
            "capability" => capability.as_str(),
            "result" => result_label
        )
        .increment(1);
        histogram!("story_job_duration_seconds", "capability" => capability.as_str())
            .record(started.elapsed().as_secs_f64());
        gauge!("story_jobs_in_flight").decrement(1.0);

        if let Err(e) = ctx.queue.ack(&delivery_id).await {
            error!("Failed to ack job {}: {}", job_id, e);
        }
    }

    /// Job body: `STARTED`, the capability's work, then `SUCCESS`.
    async fn run_job(
        ctx: Arc<ExecutionContext>,
        job: QueuedJob,
        logger: JobLogger,
    ) -> WorkerResult<()> {
        let mut reporter = JobReporter::load(Arc::clone(&ctx.store), &job.job_id).await?;
        if reporter.record().is_terminal() {
            logger.log_warning(&format!(
                "Skipping redelivered job already in state {}",
                reporter.state()
            ));
            return Ok(());
        }

        let capability = job.request.capability();
        reporter
            .started(format!("Starting {}...", capability))
            .await?;
        logger.log_start(&format!("queued at {}", job.enqueued_at));

        let backend = ctx.backends.checkout().await?;
        let task_ctx = TaskContext {
            backend: backend.as_ref(),
            config: &ctx.config,
            logger: &logger,
        };
        let result = tasks::run(&task_ctx, &mut reporter, &job.request).await?;

        reporter.succeeded(result).await?;
        logger.log_completion(&format!("{} finished", capability));
        Ok(())
    }

    /// Write `FAILURE` unless the record is already terminal, retrying store errors.
    async fn record_failure(store: &Arc<dyn JobStore>, job_id: &JobId, message: &str) {
        let retry = StoreRetry::default();
        let result = retry
            .run("record job failure", || fail_record(Arc::clone(store), job_id, message))
            .await;
        if let Err(e) = result {
            error!(job_id = %job_id, "Could not record failure: {}", e);
        }
    }

    /// Jobs currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.ctx.config.max_concurrent_jobs - self.job_semaphore.available_permits()
    }

    /// Wait for all in-flight jobs to complete.
    async fn wait_for_jobs(&self) {
        while self.in_flight() > 0 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

async fn fail_record(store: Arc<dyn JobStore>, job_id: &JobId, message: &str) -> QueueResult<()> {
    let mut reporter = JobReporter::load(store, job_id).await?;
    if reporter.record().is_terminal() {
        return Ok(());
    }
    reporter.failed(message).await
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use story_models::{Capability, JobRecord, JobState};
    use story_queue::{MemoryJobStore, QueueError};

    /// Rejects the first `outages` writes as if redis were down.
    struct FlakyStore {
        inner: MemoryJobStore,
        outages: AtomicU32,
    }

    #[async_trait]
    impl JobStore for FlakyStore {
        async fn create(&self, record: &JobRecord) -> QueueResult<()> {
            self.inner.create(record).await
        }

        async fn get(&self, job_id: &JobId) -> QueueResult<Option<JobRecord>> {
            self.inner.get(job_id).await
        }

        async fn put(&self, record: &JobRecord) -> QueueResult<()> {
            let left = self.outages.load(Ordering::SeqCst);
            if left > 0 {
                self.outages.store(left - 1, Ordering::SeqCst);
                return Err(QueueError::connection_failed("redis down"));
            }
            self.inner.put(record).await
        }

        async fn delete(&self, job_id: &JobId) -> QueueResult<()> {
            self.inner.delete(job_id).await
        }

        async fn ping(&self) -> QueueResult<()> {
            Ok(())
        }
    }

    async fn flaky_store(outages: u32, job_id: &JobId) -> Arc<dyn JobStore> {
        let store = FlakyStore {
            inner: MemoryJobStore::new(),
            outages: AtomicU32::new(outages),
        };
        store
            .create(&JobRecord::new(job_id.clone(), Capability::GenerateScript))
            .await
            .unwrap();
        Arc::new(store)
    }

    #[tokio::test]
    async fn test_failure_recorded_through_store_outage() {
        let job_id = JobId::from_string("job-1");
        let store = flaky_store(2, &job_id).await;

        JobExecutor::record_failure(&store, &job_id, "timed out").await;

        let record = store.get(&job_id).await.unwrap().unwrap();
        assert_eq!(record.state, JobState::Failure);
        assert_eq!(record.error.as_deref(), Some("timed out"));
    }

    #[tokio::test]
    async fn test_failure_not_written_over_terminal_record() {
        let job_id = JobId::from_string("job-2");
        let store = flaky_store(0, &job_id).await;
        let mut record = store.get(&job_id).await.unwrap().unwrap();
        record.fail("first").unwrap();
        store.put(&record).await.unwrap();

        JobExecutor::record_failure(&store, &job_id, "second").await;

        let record = store.get(&job_id).await.unwrap().unwrap();
        assert_eq!(record.error.as_deref(), Some("first"));
    }

    #[test]
    fn test_panic_message_extracts_payload() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new("bad".to_string())), "bad");
        assert_eq!(panic_message(Box::new(7u8)), "unknown panic");
    }
}
