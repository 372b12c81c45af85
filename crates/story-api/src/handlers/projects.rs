//! Project store mirror.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use tracing::info;

use story_models::{Project, ProjectSummary, SceneUpdate, StoryDocument};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

async fn load(state: &AppState, id: &str) -> ApiResult<Project> {
    state
        .projects
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Project {} not found", id)))
}

/// `POST /api/projects`
pub async fn create_project(
    State(state): State<AppState>,
    Json(mut document): Json<StoryDocument>,
) -> ApiResult<(StatusCode, Json<Project>)> {
    document.align_to_scenes();
    let project = Project::new(document);
    state.projects.create(&project).await?;
    info!(project_id = %project.id, "Created project");
    Ok((StatusCode::CREATED, Json(project)))
}

/// `GET /api/projects`
pub async fn list_projects(State(state): State<AppState>) -> ApiResult<Json<Vec<ProjectSummary>>> {
    Ok(Json(state.projects.list().await?))
}

/// `GET /api/projects/:id`
pub async fn get_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Project>> {
    Ok(Json(load(&state, &id).await?))
}

/// `PUT /api/projects/:id` replaces the whole document.
pub async fn update_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(mut document): Json<StoryDocument>,
) -> ApiResult<Json<Project>> {
    let mut project = load(&state, &id).await?;
    document.align_to_scenes();
    project.document = document;
    project.updated_at = Utc::now();
    state.projects.put(&project).await?;
    Ok(Json(project))
}

/// `PUT /api/projects/:id/scenes/:scene_number`
pub async fn update_scene(
    State(state): State<AppState>,
    Path((id, scene_number)): Path<(String, u32)>,
    Json(update): Json<SceneUpdate>,
) -> ApiResult<Json<Project>> {
    let mut project = load(&state, &id).await?;
    if !project.document.apply_scene_update(scene_number, &update) {
        return Err(ApiError::not_found(format!(
            "Scene {} not found in project {}",
            scene_number, id
        )));
    }
    project.updated_at = Utc::now();
    state.projects.put(&project).await?;
    Ok(Json(project))
}

/// `DELETE /api/projects/:id`
pub async fn delete_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    if state.projects.delete(&id).await? {
        info!(project_id = %id, "Deleted project");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(format!("Project {} not found", id)))
    }
}
