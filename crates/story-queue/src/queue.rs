//! Work queue feeding the executor pool.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use story_models::{JobId, JobRequest};

use crate::config::QueueConfig;
use crate::error::{QueueError, QueueResult};

/// A unit of work waiting for an executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedJob {
    pub job_id: JobId,
    pub request: JobRequest,
    pub enqueued_at: DateTime<Utc>,
}

impl QueuedJob {
    pub fn new(job_id: JobId, request: JobRequest) -> Self {
        Self {
            job_id,
            request,
            enqueued_at: Utc::now(),
        }
    }
}

/// A job handed to a consumer, to be acknowledged by `delivery_id` once done.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub delivery_id: String,
    pub job: QueuedJob,
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Append a job and return its delivery id.
    async fn enqueue(&self, job: &QueuedJob) -> QueueResult<String>;

    /// Take up to `count` jobs, waiting at most `block` for the first one.
    async fn consume(&self, consumer: &str, block: Duration, count: usize)
        -> QueueResult<Vec<Delivery>>;

    async fn ack(&self, delivery_id: &str) -> QueueResult<()>;

    /// Jobs enqueued but not yet consumed.
    async fn len(&self) -> QueueResult<u64>;

    async fn ping(&self) -> QueueResult<()>;
}

/// In-process queue over a tokio channel.
pub struct MemoryJobQueue {
    tx: mpsc::UnboundedSender<Delivery>,
    rx: Mutex<mpsc::UnboundedReceiver<Delivery>>,
    next_id: AtomicU64,
    queued: AtomicU64,
    closed: AtomicBool,
}

impl Default for MemoryJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
            next_id: AtomicU64::new(1),
            queued: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Refuse further enqueues. Jobs already queued can still be consumed.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, job: &QueuedJob) -> QueueResult<String> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(QueueError::Closed);
        }
        let delivery_id = format!("mem-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.tx
            .send(Delivery {
                delivery_id: delivery_id.clone(),
                job: job.clone(),
            })
            .map_err(|_| QueueError::Closed)?;
        self.queued.fetch_add(1, Ordering::SeqCst);
        debug!(job_id = %job.job_id, delivery_id = %delivery_id, "Enqueued job");
        Ok(delivery_id)
    }

    async fn consume(
        &self,
        _consumer: &str,
        block: Duration,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let mut rx = self.rx.lock().await;
        let mut deliveries = Vec::new();

        match tokio::time::timeout(block, rx.recv()).await {
            Ok(Some(first)) => deliveries.push(first),
            Ok(None) => return Err(QueueError::Closed),
            Err(_) => return Ok(deliveries),
        }
        while deliveries.len() < count {
            match rx.try_recv() {
                Ok(delivery) => deliveries.push(delivery),
                Err(_) => break,
            }
        }

        self.queued
            .fetch_sub(deliveries.len() as u64, Ordering::SeqCst);
        Ok(deliveries)
    }

    async fn ack(&self, delivery_id: &str) -> QueueResult<()> {
        debug!(delivery_id, "Acknowledged job");
        Ok(())
    }

    async fn len(&self) -> QueueResult<u64> {
        Ok(self.queued.load(Ordering::SeqCst))
    }

    async fn ping(&self) -> QueueResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(QueueError::Closed);
        }
        Ok(())
    }
}

/// Job queue on a Redis Stream with one consumer group.
pub struct RedisJobQueue {
    client: redis::Client,
    config: QueueConfig,
}

impl RedisJobQueue {
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    /// Create the consumer group if it does not exist yet.
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!("Created consumer group: {}", self.config.consumer_group),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("Consumer group already exists: {}", self.config.consumer_group);
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }

        Ok(())
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn enqueue(&self, job: &QueuedJob) -> QueueResult<String> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::enqueue_failed(e.to_string()))?;

        let payload = serde_json::to_string(job)?;
        let message_id: String = redis::cmd("XADD")
            .arg(&self.config.stream_name)
            .arg("*")
            .arg("job")
            .arg(&payload)
            .arg("capability")
            .arg(job.request.capability().as_str())
            .query_async(&mut conn)
            .await?;

        info!(job_id = %job.job_id, message_id = %message_id, "Enqueued job");
        Ok(message_id)
    }

    async fn consume(
        &self,
        consumer: &str,
        block: Duration,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let reply: Option<redis::streams::StreamReadReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block.as_millis() as u64)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">")
            .query_async(&mut conn)
            .await
            .map_err(|e| QueueError::DequeueFailed(e.to_string()))?;

        let mut deliveries = Vec::new();
        let Some(reply) = reply else {
            return Ok(deliveries);
        };

        for stream_key in reply.keys {
            for entry in stream_key.ids {
                let message_id = entry.id.clone();
                let Some(redis::Value::BulkString(payload)) = entry.map.get("job") else {
                    continue;
                };
                let payload = String::from_utf8_lossy(payload);
                match serde_json::from_str::<QueuedJob>(&payload) {
                    Ok(job) => {
                        debug!(job_id = %job.job_id, "Consumed job from stream");
                        deliveries.push(Delivery {
                            delivery_id: message_id,
                            job,
                        });
                    }
                    Err(e) => {
                        warn!("Failed to parse job payload: {}", e);
                        // Ack the malformed message to prevent reprocessing
                        self.ack(&message_id).await.ok();
                    }
                }
            }
        }

        Ok(deliveries)
    }

    async fn ack(&self, delivery_id: &str) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        redis::cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(delivery_id)
            .query_async::<()>(&mut conn)
            .await?;

        redis::cmd("XDEL")
            .arg(&self.config.stream_name)
            .arg(delivery_id)
            .query_async::<()>(&mut conn)
            .await?;

        debug!("Acknowledged job: {}", delivery_id);
        Ok(())
    }

    async fn len(&self) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: u64 = conn.xlen(&self.config.stream_name).await?;
        Ok(len)
    }

    async fn ping(&self) -> QueueResult<()> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::connection_failed(e.to_string()))?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}
