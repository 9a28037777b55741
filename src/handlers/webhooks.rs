//! # Webhook Configuration Handlers
//!
//! Subscriber endpoint management plus an on-demand fan-out trigger.

use axum::{
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{UserExtension, UserHeader};
use crate::error::{ApiError, validation_error};
use crate::models::webhook_config;
use crate::repositories::webhook_config::NewWebhookConfig;
use crate::server::AppState;
use crate::webhook_dispatch::WebhookEvent;

#[derive(Debug, Deserialize, ToSchema)]
pub struct TriggerRequest {
    /// One of `lead.created`, `lead.updated`, `lead.won`, `task.created`
    pub event: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub payload: Value,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TriggerResponse {
    /// True when every matching endpoint accepted the delivery
    pub success: bool,
    pub count: usize,
    pub delivered: usize,
    pub failed: usize,
}

#[utoipa::path(
    get,
    path = "/webhooks",
    security(("bearer_auth" = [])),
    params(UserHeader),
    responses(
        (status = 200, description = "Registered endpoints", body = [webhook_config::Model])
    ),
    tag = "webhooks"
)]
pub async fn list_webhooks(
    State(state): State<AppState>,
    UserExtension(user): UserExtension,
) -> Result<Json<Vec<webhook_config::Model>>, ApiError> {
    Ok(Json(state.webhooks.list(user.0).await?))
}

#[utoipa::path(
    post,
    path = "/webhooks",
    security(("bearer_auth" = [])),
    params(UserHeader),
    request_body = NewWebhookConfig,
    responses(
        (status = 201, description = "Endpoint registered", body = webhook_config::Model),
        (status = 400, description = "Invalid URL or event name", body = ApiError)
    ),
    tag = "webhooks"
)]
pub async fn create_webhook(
    State(state): State<AppState>,
    UserExtension(user): UserExtension,
    body: Result<Json<NewWebhookConfig>, JsonRejection>,
) -> Result<(StatusCode, Json<webhook_config::Model>), ApiError> {
    let Json(new) = body?;
    let config = state.webhooks.create(user.0, new).await?;
    Ok((StatusCode::CREATED, Json(config)))
}

#[utoipa::path(
    delete,
    path = "/webhooks/{id}",
    security(("bearer_auth" = [])),
    params(UserHeader, ("id" = Uuid, Path, description = "Webhook config id")),
    responses(
        (status = 204, description = "Endpoint removed"),
        (status = 404, description = "Webhook not found", body = ApiError)
    ),
    tag = "webhooks"
)]
pub async fn delete_webhook(
    State(state): State<AppState>,
    UserExtension(user): UserExtension,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.webhooks.delete(user.0, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Delivers an event to every subscribed endpoint and waits for the outcome
#[utoipa::path(
    post,
    path = "/webhooks/trigger",
    security(("bearer_auth" = [])),
    params(UserHeader),
    request_body = TriggerRequest,
    responses(
        (status = 200, description = "Delivery report", body = TriggerResponse),
        (status = 400, description = "Unknown event", body = ApiError)
    ),
    tag = "webhooks"
)]
pub async fn trigger_webhooks(
    State(state): State<AppState>,
    UserExtension(user): UserExtension,
    body: Result<Json<TriggerRequest>, JsonRejection>,
) -> Result<Json<TriggerResponse>, ApiError> {
    let Json(request) = body?;
    let event = WebhookEvent::from_name(request.event.trim()).ok_or_else(|| {
        validation_error(
            "Unknown event",
            json!({ "event": format!("unknown event '{}'", request.event) }),
        )
    })?;

    let report = state
        .dispatcher
        .dispatch(user.0, event.as_str(), request.payload)
        .await?;

    Ok(Json(TriggerResponse {
        success: report.failed == 0,
        count: report.count,
        delivered: report.delivered,
        failed: report.failed,
    }))
}
