//! Project store: the persisted mirror of client story documents.

use std::collections::HashMap;

use async_trait::async_trait;
use redis::AsyncCommands;
use tokio::sync::RwLock;
use tracing::debug;

use story_models::{Project, ProjectSummary};
use story_queue::QueueConfig;

use crate::error::ApiResult;

#[async_trait]
pub trait ProjectRepository: Send + Sync {
    async fn create(&self, project: &Project) -> ApiResult<()>;

    async fn get(&self, id: &str) -> ApiResult<Option<Project>>;

    /// Summaries, most recently updated first.
    async fn list(&self) -> ApiResult<Vec<ProjectSummary>>;

    async fn put(&self, project: &Project) -> ApiResult<()>;

    /// Returns whether a project was removed.
    async fn delete(&self, id: &str) -> ApiResult<bool>;
}

fn newest_first(mut summaries: Vec<ProjectSummary>) -> Vec<ProjectSummary> {
    summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    summaries
}

#[derive(Default)]
pub struct MemoryProjectRepository {
    projects: RwLock<HashMap<String, Project>>,
}

impl MemoryProjectRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProjectRepository for MemoryProjectRepository {
    async fn create(&self, project: &Project) -> ApiResult<()> {
        self.put(project).await
    }

    async fn get(&self, id: &str) -> ApiResult<Option<Project>> {
        Ok(self.projects.read().await.get(id).cloned())
    }

    async fn list(&self) -> ApiResult<Vec<ProjectSummary>> {
        let projects = self.projects.read().await;
        Ok(newest_first(projects.values().map(Project::summary).collect()))
    }

    async fn put(&self, project: &Project) -> ApiResult<()> {
        self.projects
            .write()
            .await
            .insert(project.id.clone(), project.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> ApiResult<bool> {
        Ok(self.projects.write().await.remove(id).is_some())
    }
}

/// Projects as JSON values at `story:project:{id}` plus an id index set.
pub struct RedisProjectRepository {
    client: redis::Client,
    key_prefix: String,
    index_key: String,
}

impl RedisProjectRepository {
    pub fn new(config: &QueueConfig) -> ApiResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self {
            client,
            key_prefix: "story:project".to_string(),
            index_key: "story:projects".to_string(),
        })
    }

    fn key(&self, id: &str) -> String {
        format!("{}:{}", self.key_prefix, id)
    }

    async fn conn(&self) -> ApiResult<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }
}

#[async_trait]
impl ProjectRepository for RedisProjectRepository {
    async fn create(&self, project: &Project) -> ApiResult<()> {
        self.put(project).await
    }

    async fn get(&self, id: &str) -> ApiResult<Option<Project>> {
        let mut conn = self.conn().await?;
        let raw: Option<String> = conn.get(self.key(id)).await?;
        raw.map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(Into::into)
    }

    async fn list(&self) -> ApiResult<Vec<ProjectSummary>> {
        let mut conn = self.conn().await?;
        let ids: Vec<String> = conn.smembers(&self.index_key).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let keys: Vec<String> = ids.iter().map(|id| self.key(id)).collect();
        let raw: Vec<Option<String>> = redis::cmd("MGET").arg(&keys).query_async(&mut conn).await?;
        let summaries = raw
            .into_iter()
            .flatten()
            .filter_map(|json| serde_json::from_str::<Project>(&json).ok())
            .map(|project| project.summary())
            .collect();
        Ok(newest_first(summaries))
    }

    async fn put(&self, project: &Project) -> ApiResult<()> {
        let mut conn = self.conn().await?;
        let json = serde_json::to_string(project)?;
        redis::pipe()
            .atomic()
            .set(self.key(&project.id), json)
            .sadd(&self.index_key, &project.id)
            .query_async::<()>(&mut conn)
            .await?;
        debug!(project_id = %project.id, "Stored project");
        Ok(())
    }

    async fn delete(&self, id: &str) -> ApiResult<bool> {
        let mut conn = self.conn().await?;
        let (removed, _): (u32, u32) = redis::pipe()
            .atomic()
            .del(self.key(id))
            .srem(&self.index_key, id)
            .query_async(&mut conn)
            .await?;
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use story_models::StoryDocument;

    #[tokio::test]
    async fn test_memory_repository_lifecycle() {
        let repo = MemoryProjectRepository::new();
        let mut older = Project::new(StoryDocument::default());
        older.updated_at = older.updated_at - chrono::Duration::minutes(5);
        let newer = Project::new(StoryDocument {
            title: "Moon Rabbit".into(),
            ..Default::default()
        });

        repo.create(&older).await.unwrap();
        repo.create(&newer).await.unwrap();

        let list = repo.list().await.unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id, newer.id);

        assert!(repo.delete(&older.id).await.unwrap());
        assert!(!repo.delete(&older.id).await.unwrap());
        assert!(repo.get(&older.id).await.unwrap().is_none());
    }
}
