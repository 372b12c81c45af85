//! Project store mirror.

use async_trait::async_trait;
use reqwest::Client;

use story_models::{Project, ProjectSummary, SceneUpdate, StoryDocument};

use crate::api::error_from_response;
use crate::config::ClientConfig;
use crate::error::ClientResult;

/// Persistence for saved stories. Treated as a mirror of the in-memory
/// document, never as the source of truth while a story is open.
#[async_trait]
pub trait ProjectSync: Send + Sync {
    async fn create(&self, document: &StoryDocument) -> ClientResult<Project>;

    async fn get(&self, id: &str) -> ClientResult<Project>;

    /// Newest first.
    async fn list(&self) -> ClientResult<Vec<ProjectSummary>>;

    async fn update(&self, id: &str, document: &StoryDocument) -> ClientResult<Project>;

    async fn update_scene(
        &self,
        id: &str,
        scene_number: u32,
        update: &SceneUpdate,
    ) -> ClientResult<Project>;

    async fn delete(&self, id: &str) -> ClientResult<()>;
}

pub struct HttpProjectSync {
    http: Client,
    config: ClientConfig,
}

impl HttpProjectSync {
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        let http = config.build_http_client()?;
        Ok(Self { http, config })
    }

    fn project_url(&self, id: &str) -> String {
        self.config.url(&format!("/api/projects/{}", id))
    }
}

async fn parse<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    what: &str,
) -> ClientResult<T> {
    if !response.status().is_success() {
        return Err(error_from_response(response, what).await);
    }
    Ok(response.json().await?)
}

#[async_trait]
impl ProjectSync for HttpProjectSync {
    async fn create(&self, document: &StoryDocument) -> ClientResult<Project> {
        let response = self
            .http
            .post(self.config.url("/api/projects"))
            .json(document)
            .send()
            .await?;
        parse(response, "create project").await
    }

    async fn get(&self, id: &str) -> ClientResult<Project> {
        let response = self.http.get(self.project_url(id)).send().await?;
        parse(response, &format!("project {}", id)).await
    }

    async fn list(&self) -> ClientResult<Vec<ProjectSummary>> {
        let response = self.http.get(self.config.url("/api/projects")).send().await?;
        parse(response, "list projects").await
    }

    async fn update(&self, id: &str, document: &StoryDocument) -> ClientResult<Project> {
        let response = self
            .http
            .put(self.project_url(id))
            .json(document)
            .send()
            .await?;
        parse(response, &format!("project {}", id)).await
    }

    async fn update_scene(
        &self,
        id: &str,
        scene_number: u32,
        update: &SceneUpdate,
    ) -> ClientResult<Project> {
        let url = format!("{}/scenes/{}", self.project_url(id), scene_number);
        let response = self.http.put(url).json(update).send().await?;
        parse(response, &format!("project {} scene {}", id, scene_number)).await
    }

    async fn delete(&self, id: &str) -> ClientResult<()> {
        let response = self.http.delete(self.project_url(id)).send().await?;
        if !response.status().is_success() {
            return Err(error_from_response(response, &format!("project {}", id)).await);
        }
        Ok(())
    }
}
