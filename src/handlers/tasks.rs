//! # Task API Handlers

use axum::{
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::{UserExtension, UserHeader};
use crate::error::{ApiError, validation_error};
use crate::models::task::{self, TaskPriority};
use crate::pipeline::stages;
use crate::repositories::task::{NewTask, TaskFilter, TaskPatch};
use crate::server::AppState;
use crate::webhook_dispatch::WebhookEvent;

/// Creates the suggested checklist of a stage for one lead
#[derive(Debug, Deserialize, ToSchema)]
pub struct StageTasksRequest {
    pub lead_id: Uuid,
    pub stage: String,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ToggleQuery {
    /// Target state; flips the current state when absent
    pub completed: Option<bool>,
}

fn notify_created(state: &AppState, user_id: Uuid, task: &task::Model) {
    let payload = serde_json::to_value(task).unwrap_or_else(|_| json!({ "id": task.id }));
    state
        .dispatcher
        .dispatch_in_background(&state.tracker, user_id, WebhookEvent::TaskCreated, payload);
}

#[utoipa::path(
    get,
    path = "/tasks",
    security(("bearer_auth" = [])),
    params(UserHeader, TaskFilter),
    responses(
        (status = 200, description = "Tasks by due date, undated last", body = [task::Model]),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "tasks"
)]
pub async fn list_tasks(
    State(state): State<AppState>,
    UserExtension(user): UserExtension,
    Query(filter): Query<TaskFilter>,
) -> Result<Json<Vec<task::Model>>, ApiError> {
    Ok(Json(state.tasks.list(user.0, &filter).await?))
}

#[utoipa::path(
    post,
    path = "/tasks",
    security(("bearer_auth" = [])),
    params(UserHeader),
    request_body = NewTask,
    responses(
        (status = 201, description = "Task created", body = task::Model),
        (status = 400, description = "Validation error", body = ApiError)
    ),
    tag = "tasks"
)]
pub async fn create_task(
    State(state): State<AppState>,
    UserExtension(user): UserExtension,
    body: Result<Json<NewTask>, JsonRejection>,
) -> Result<(StatusCode, Json<task::Model>), ApiError> {
    let Json(new) = body?;
    let task = state.tasks.create(user.0, new).await?;
    notify_created(&state, user.0, &task);
    Ok((StatusCode::CREATED, Json(task)))
}

#[utoipa::path(
    post,
    path = "/tasks/from-stage",
    security(("bearer_auth" = [])),
    params(UserHeader),
    request_body = StageTasksRequest,
    responses(
        (status = 201, description = "Checklist tasks created", body = [task::Model]),
        (status = 400, description = "Unknown stage", body = ApiError),
        (status = 404, description = "Lead not found", body = ApiError)
    ),
    tag = "tasks"
)]
pub async fn create_stage_tasks(
    State(state): State<AppState>,
    UserExtension(user): UserExtension,
    body: Result<Json<StageTasksRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Vec<task::Model>>), ApiError> {
    let Json(request) = body?;
    if !stages::is_known(&request.stage) {
        return Err(validation_error(
            "Unknown stage",
            json!({ "stage": format!("unknown stage '{}'", request.stage) }),
        ));
    }
    state.leads.get(user.0, request.lead_id).await?;

    let checklist = stages::stage_tasks(&request.stage)
        .iter()
        .map(|title| NewTask {
            lead_id: Some(request.lead_id),
            title: (*title).to_string(),
            description: None,
            due_date: request.due_date,
            priority: TaskPriority::Media,
            stage_related: Some(request.stage.clone()),
        })
        .collect();

    let created = state.tasks.create_many(user.0, checklist).await?;
    for task in &created {
        notify_created(&state, user.0, task);
    }
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    patch,
    path = "/tasks/{id}",
    security(("bearer_auth" = [])),
    params(UserHeader, ("id" = Uuid, Path, description = "Task id")),
    request_body = TaskPatch,
    responses(
        (status = 200, description = "Updated task", body = task::Model),
        (status = 404, description = "Task not found", body = ApiError)
    ),
    tag = "tasks"
)]
pub async fn update_task(
    State(state): State<AppState>,
    UserExtension(user): UserExtension,
    Path(id): Path<Uuid>,
    body: Result<Json<TaskPatch>, JsonRejection>,
) -> Result<Json<task::Model>, ApiError> {
    let Json(patch) = body?;
    Ok(Json(state.tasks.update(user.0, id, patch).await?))
}

#[utoipa::path(
    delete,
    path = "/tasks/{id}",
    security(("bearer_auth" = [])),
    params(UserHeader, ("id" = Uuid, Path, description = "Task id")),
    responses(
        (status = 204, description = "Task deleted"),
        (status = 404, description = "Task not found", body = ApiError)
    ),
    tag = "tasks"
)]
pub async fn delete_task(
    State(state): State<AppState>,
    UserExtension(user): UserExtension,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.tasks.delete(user.0, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/tasks/{id}/toggle",
    security(("bearer_auth" = [])),
    params(UserHeader, ("id" = Uuid, Path, description = "Task id"), ToggleQuery),
    responses(
        (status = 200, description = "Task with its new completion state", body = task::Model),
        (status = 404, description = "Task not found", body = ApiError)
    ),
    tag = "tasks"
)]
pub async fn toggle_task(
    State(state): State<AppState>,
    UserExtension(user): UserExtension,
    Path(id): Path<Uuid>,
    Query(query): Query<ToggleQuery>,
) -> Result<Json<task::Model>, ApiError> {
    let completed = match query.completed {
        Some(completed) => completed,
        None => !state.tasks.get(user.0, id).await?.completed,
    };
    Ok(Json(state.tasks.set_completed(user.0, id, completed).await?))
}
