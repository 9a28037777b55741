//! # Project API Handlers

use axum::{
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::Json,
};
use uuid::Uuid;

use crate::auth::{UserExtension, UserHeader};
use crate::error::ApiError;
use crate::models::project;
use crate::repositories::project::{NewProject, ProjectPatch};
use crate::server::AppState;

#[utoipa::path(
    get,
    path = "/projects",
    security(("bearer_auth" = [])),
    params(UserHeader),
    responses(
        (status = 200, description = "Projects, newest first", body = [project::Model])
    ),
    tag = "projects"
)]
pub async fn list_projects(
    State(state): State<AppState>,
    UserExtension(user): UserExtension,
) -> Result<Json<Vec<project::Model>>, ApiError> {
    Ok(Json(state.projects.list(user.0).await?))
}

#[utoipa::path(
    post,
    path = "/projects",
    security(("bearer_auth" = [])),
    params(UserHeader),
    request_body = NewProject,
    responses(
        (status = 201, description = "Project created", body = project::Model),
        (status = 400, description = "Validation error", body = ApiError)
    ),
    tag = "projects"
)]
pub async fn create_project(
    State(state): State<AppState>,
    UserExtension(user): UserExtension,
    body: Result<Json<NewProject>, JsonRejection>,
) -> Result<(StatusCode, Json<project::Model>), ApiError> {
    let Json(new) = body?;
    let project = state.projects.create(user.0, new).await?;
    Ok((StatusCode::CREATED, Json(project)))
}

#[utoipa::path(
    patch,
    path = "/projects/{id}",
    security(("bearer_auth" = [])),
    params(UserHeader, ("id" = Uuid, Path, description = "Project id")),
    request_body = ProjectPatch,
    responses(
        (status = 200, description = "Updated project", body = project::Model),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 404, description = "Project not found", body = ApiError)
    ),
    tag = "projects"
)]
pub async fn update_project(
    State(state): State<AppState>,
    UserExtension(user): UserExtension,
    Path(id): Path<Uuid>,
    body: Result<Json<ProjectPatch>, JsonRejection>,
) -> Result<Json<project::Model>, ApiError> {
    let Json(patch) = body?;
    Ok(Json(state.projects.update(user.0, id, patch).await?))
}

#[utoipa::path(
    delete,
    path = "/projects/{id}",
    security(("bearer_auth" = [])),
    params(UserHeader, ("id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 204, description = "Project deleted"),
        (status = 404, description = "Project not found", body = ApiError)
    ),
    tag = "projects"
)]
pub async fn delete_project(
    State(state): State<AppState>,
    UserExtension(user): UserExtension,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.projects.delete(user.0, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
