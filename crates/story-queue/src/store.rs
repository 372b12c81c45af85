//! Job store: the authoritative record of every job's state.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use tokio::sync::RwLock;
use tracing::debug;

use story_models::{JobId, JobRecord};

use crate::config::QueueConfig;
use crate::error::{QueueError, QueueResult};

/// Shared key-value store of job records.
///
/// Written by the submission API (creation) and by the one executor that owns
/// a job; read by everyone else.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new record. Fails if the id is already taken.
    async fn create(&self, record: &JobRecord) -> QueueResult<()>;

    async fn get(&self, job_id: &JobId) -> QueueResult<Option<JobRecord>>;

    /// Overwrite an existing record.
    async fn put(&self, record: &JobRecord) -> QueueResult<()>;

    async fn delete(&self, job_id: &JobId) -> QueueResult<()>;

    /// Check the store is reachable.
    async fn ping(&self) -> QueueResult<()>;
}

/// Process-local job store.
#[derive(Default)]
pub struct MemoryJobStore {
    records: RwLock<HashMap<JobId, JobRecord>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, record: &JobRecord) -> QueueResult<()> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.job_id) {
            return Err(QueueError::AlreadyExists(record.job_id.to_string()));
        }
        records.insert(record.job_id.clone(), record.clone());
        Ok(())
    }

    async fn get(&self, job_id: &JobId) -> QueueResult<Option<JobRecord>> {
        Ok(self.records.read().await.get(job_id).cloned())
    }

    async fn put(&self, record: &JobRecord) -> QueueResult<()> {
        self.records
            .write()
            .await
            .insert(record.job_id.clone(), record.clone());
        Ok(())
    }

    async fn delete(&self, job_id: &JobId) -> QueueResult<()> {
        self.records.write().await.remove(job_id);
        Ok(())
    }

    async fn ping(&self) -> QueueResult<()> {
        Ok(())
    }
}

/// Redis-backed job store. Each record is a JSON string that expires
/// `job_retention` after its last write.
pub struct RedisJobStore {
    client: redis::Client,
    key_prefix: String,
    retention: Duration,
}

impl RedisJobStore {
    pub fn new(config: &QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self {
            client,
            key_prefix: config.job_key_prefix.clone(),
            retention: config.job_retention,
        })
    }

    fn key(&self, job_id: &JobId) -> String {
        format!("{}:{}", self.key_prefix, job_id)
    }

    fn retention_secs(&self) -> u64 {
        self.retention.as_secs().max(1)
    }
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn create(&self, record: &JobRecord) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(record)?;

        let reply: Option<String> = redis::cmd("SET")
            .arg(self.key(&record.job_id))
            .arg(&payload)
            .arg("NX")
            .arg("EX")
            .arg(self.retention_secs())
            .query_async(&mut conn)
            .await?;

        if reply.is_none() {
            return Err(QueueError::AlreadyExists(record.job_id.to_string()));
        }
        debug!(job_id = %record.job_id, "Created job record");
        Ok(())
    }

    async fn get(&self, job_id: &JobId) -> QueueResult<Option<JobRecord>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload: Option<String> = conn.get(self.key(job_id)).await?;
        match payload {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, record: &JobRecord) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(record)?;
        conn.set_ex::<_, _, ()>(self.key(&record.job_id), payload, self.retention_secs())
            .await?;
        Ok(())
    }

    async fn delete(&self, job_id: &JobId) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.del::<_, ()>(self.key(job_id)).await?;
        Ok(())
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

#[cfg(test)]
mod tests {
    use super::*;
    use story_models::{Capability, JobState};

    #[tokio::test]
    async fn test_memory_store_create_is_exclusive() {
        let store = MemoryJobStore::new();
        let record = JobRecord::new(JobId::new(), Capability::GenerateScript);

        store.create(&record).await.unwrap();
        let err = store.create(&record).await.unwrap_err();
        assert!(matches!(err, QueueError::AlreadyExists(_)));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_memory_store_put_and_delete() {
        let store = MemoryJobStore::new();
        let mut record = JobRecord::new(JobId::new(), Capability::GenerateVideos);
        store.create(&record).await.unwrap();

        record.start("Starting").unwrap();
        store.put(&record).await.unwrap();
        let loaded = store.get(&record.job_id).await.unwrap().unwrap();
        assert_eq!(loaded.state, JobState::Started);

        store.delete(&record.job_id).await.unwrap();
        assert!(store.get(&record.job_id).await.unwrap().is_none());
    }

    #[tokio::test]
    #[ignore = "requires a running Redis server"]
    async fn test_redis_store_round_trip() {
        let store = RedisJobStore::new(&QueueConfig::from_env()).unwrap();
        let record = JobRecord::new(JobId::new(), Capability::GenerateNarrations);
        store.create(&record).await.unwrap();

        let loaded = store.get(&record.job_id).await.unwrap().unwrap();
        assert_eq!(loaded.capability, Capability::GenerateNarrations);

        store.delete(&record.job_id).await.unwrap();
        assert!(store.get(&record.job_id).await.unwrap().is_none());
    }
}
