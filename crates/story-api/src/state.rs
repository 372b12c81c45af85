//! Application state.

use std::sync::Arc;

use story_queue::{
    JobQueue, JobStore, MemoryJobQueue, MemoryJobStore, QueueConfig, RedisJobQueue, RedisJobStore,
};

use crate::config::{ApiConfig, StoreBackend};
use crate::repository::{MemoryProjectRepository, ProjectRepository, RedisProjectRepository};
use crate::services::SubmissionService;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub store: Arc<dyn JobStore>,
    pub queue: Arc<dyn JobQueue>,
    pub projects: Arc<dyn ProjectRepository>,
    pub submissions: SubmissionService,
}

impl AppState {
    /// Create state for the configured backend.
    pub async fn new(config: ApiConfig) -> anyhow::Result<Self> {
        match config.store_backend {
            StoreBackend::Memory => Ok(Self::in_memory(config)),
            StoreBackend::Redis => {
                let queue_config = QueueConfig::from_env();
                let queue = RedisJobQueue::new(queue_config.clone())?;
                queue.init().await?;
                let store = RedisJobStore::new(&queue_config)?;
                let projects = RedisProjectRepository::new(&queue_config)?;
                Ok(Self::from_parts(
                    config,
                    Arc::new(store),
                    Arc::new(queue),
                    Arc::new(projects),
                ))
            }
        }
    }

    /// Process-local store, queue and projects.
    pub fn in_memory(config: ApiConfig) -> Self {
        Self::from_parts(
            config,
            Arc::new(MemoryJobStore::new()),
            Arc::new(MemoryJobQueue::new()),
            Arc::new(MemoryProjectRepository::new()),
        )
    }

    pub fn from_parts(
        config: ApiConfig,
        store: Arc<dyn JobStore>,
        queue: Arc<dyn JobQueue>,
        projects: Arc<dyn ProjectRepository>,
    ) -> Self {
        let submissions = SubmissionService::new(Arc::clone(&store), Arc::clone(&queue));
        Self {
            config,
            store,
            queue,
            projects,
            submissions,
        }
    }
}
