//! # Lead API Handlers
//!
//! CRUD, stage moves and follow-up recording for the user's leads. All writes
//! go through [`LeadStore`](crate::lead_store::LeadStore).

use axum::{
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::{
        Json,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{UserExtension, UserHeader};
use crate::error::ApiError;
use crate::lead_store::{FollowUpOutcome, LeadPatch, NewLead};
use crate::models::{lead_interaction, lead_stage_history};
use crate::pipeline::{BoardFilter, LeadView};
use crate::realtime::{FeedItem, user_stream};
use crate::server::AppState;

/// Body of a stage move
#[derive(Debug, Deserialize, ToSchema)]
pub struct MoveLeadRequest {
    /// Target stage id from the catalog
    pub new_stage: String,
    /// Stage the caller last saw; recorded as the transition source
    pub previous_stage: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LeadsResponse {
    pub leads: Vec<LeadView>,
}

/// Lists the user's leads with derived fields
#[utoipa::path(
    get,
    path = "/leads",
    security(("bearer_auth" = [])),
    params(UserHeader, BoardFilter),
    responses(
        (status = 200, description = "Leads, newest first", body = LeadsResponse),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "leads"
)]
pub async fn list_leads(
    State(state): State<AppState>,
    UserExtension(user): UserExtension,
    Query(filter): Query<BoardFilter>,
) -> Result<Json<LeadsResponse>, ApiError> {
    let leads = state
        .leads
        .list_views(user.0)
        .await?
        .into_iter()
        .filter(|view| filter.matches(view))
        .collect();
    Ok(Json(LeadsResponse { leads }))
}

/// Creates a lead with pipeline defaults for unset fields
#[utoipa::path(
    post,
    path = "/leads",
    security(("bearer_auth" = [])),
    params(UserHeader),
    request_body = NewLead,
    responses(
        (status = 201, description = "Lead created", body = LeadView),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "leads"
)]
pub async fn create_lead(
    State(state): State<AppState>,
    UserExtension(user): UserExtension,
    body: Result<Json<NewLead>, JsonRejection>,
) -> Result<(StatusCode, Json<LeadView>), ApiError> {
    let Json(new) = body?;
    let lead = state.leads.create(user.0, new).await?;
    Ok((StatusCode::CREATED, Json(state.leads.view(&lead))))
}

#[utoipa::path(
    get,
    path = "/leads/{id}",
    security(("bearer_auth" = [])),
    params(UserHeader, ("id" = Uuid, Path, description = "Lead id")),
    responses(
        (status = 200, description = "Lead", body = LeadView),
        (status = 404, description = "Lead not found", body = ApiError)
    ),
    tag = "leads"
)]
pub async fn get_lead(
    State(state): State<AppState>,
    UserExtension(user): UserExtension,
    Path(id): Path<Uuid>,
) -> Result<Json<LeadView>, ApiError> {
    let lead = state.leads.get(user.0, id).await?;
    Ok(Json(state.leads.view(&lead)))
}

/// Applies a partial update; stage changes are rejected here
#[utoipa::path(
    patch,
    path = "/leads/{id}",
    security(("bearer_auth" = [])),
    params(UserHeader, ("id" = Uuid, Path, description = "Lead id")),
    request_body = LeadPatch,
    responses(
        (status = 200, description = "Updated lead", body = LeadView),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 404, description = "Lead not found", body = ApiError)
    ),
    tag = "leads"
)]
pub async fn update_lead(
    State(state): State<AppState>,
    UserExtension(user): UserExtension,
    Path(id): Path<Uuid>,
    body: Result<Json<LeadPatch>, JsonRejection>,
) -> Result<Json<LeadView>, ApiError> {
    let Json(patch) = body?;
    let lead = state.leads.update(user.0, id, patch).await?;
    Ok(Json(state.leads.view(&lead)))
}

#[utoipa::path(
    delete,
    path = "/leads/{id}",
    security(("bearer_auth" = [])),
    params(UserHeader, ("id" = Uuid, Path, description = "Lead id")),
    responses(
        (status = 204, description = "Lead and its history deleted"),
        (status = 404, description = "Lead not found", body = ApiError)
    ),
    tag = "leads"
)]
pub async fn delete_lead(
    State(state): State<AppState>,
    UserExtension(user): UserExtension,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.leads.remove(user.0, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Moves a lead to another pipeline stage
#[utoipa::path(
    post,
    path = "/leads/{id}/move",
    security(("bearer_auth" = [])),
    params(UserHeader, ("id" = Uuid, Path, description = "Lead id")),
    request_body = MoveLeadRequest,
    responses(
        (status = 200, description = "Moved lead", body = LeadView),
        (status = 400, description = "Unknown stage", body = ApiError),
        (status = 404, description = "Lead not found", body = ApiError)
    ),
    tag = "leads"
)]
pub async fn move_lead(
    State(state): State<AppState>,
    UserExtension(user): UserExtension,
    Path(id): Path<Uuid>,
    body: Result<Json<MoveLeadRequest>, JsonRejection>,
) -> Result<Json<LeadView>, ApiError> {
    let Json(request) = body?;
    let lead = state
        .leads
        .move_stage(
            user.0,
            id,
            request.new_stage.trim(),
            request.previous_stage.as_deref(),
            request.notes,
        )
        .await?;
    Ok(Json(state.leads.view(&lead)))
}

/// Records a contact made today and schedules the next follow-up
#[utoipa::path(
    post,
    path = "/leads/{id}/follow-up",
    security(("bearer_auth" = [])),
    params(UserHeader, ("id" = Uuid, Path, description = "Lead id")),
    responses(
        (status = 200, description = "Follow-up recorded", body = FollowUpOutcome),
        (status = 404, description = "Lead not found", body = ApiError),
        (status = 422, description = "Lead has no phone number", body = ApiError)
    ),
    tag = "leads"
)]
pub async fn mark_follow_up(
    State(state): State<AppState>,
    UserExtension(user): UserExtension,
    Path(id): Path<Uuid>,
) -> Result<Json<FollowUpOutcome>, ApiError> {
    let outcome = state.leads.mark_follow_up(user.0, id).await?;
    Ok(Json(outcome))
}

#[utoipa::path(
    get,
    path = "/leads/{id}/history",
    security(("bearer_auth" = [])),
    params(UserHeader, ("id" = Uuid, Path, description = "Lead id")),
    responses(
        (status = 200, description = "Stage transitions, newest first", body = [lead_stage_history::Model]),
        (status = 404, description = "Lead not found", body = ApiError)
    ),
    tag = "leads"
)]
pub async fn lead_history(
    State(state): State<AppState>,
    UserExtension(user): UserExtension,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<lead_stage_history::Model>>, ApiError> {
    Ok(Json(state.leads.history(user.0, id).await?))
}

#[utoipa::path(
    get,
    path = "/leads/{id}/interactions",
    security(("bearer_auth" = [])),
    params(UserHeader, ("id" = Uuid, Path, description = "Lead id")),
    responses(
        (status = 200, description = "Interaction log, newest first", body = [lead_interaction::Model]),
        (status = 404, description = "Lead not found", body = ApiError)
    ),
    tag = "leads"
)]
pub async fn lead_interactions(
    State(state): State<AppState>,
    UserExtension(user): UserExtension,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<lead_interaction::Model>>, ApiError> {
    Ok(Json(state.leads.interactions(user.0, id).await?))
}

/// Live lead changes for the user as server-sent events
///
/// `change` events carry `{type: INSERT|UPDATE|DELETE, record}`. A `lagged`
/// event means changes were dropped and the client should reload `/leads`.
#[utoipa::path(
    get,
    path = "/leads/stream",
    security(("bearer_auth" = [])),
    params(UserHeader),
    responses(
        (status = 200, description = "Event stream of lead changes", content_type = "text/event-stream", body = String),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "leads"
)]
pub async fn lead_stream(
    State(state): State<AppState>,
    UserExtension(user): UserExtension,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    tracing::debug!(user_id = %user.0, "Lead stream opened");
    let events = user_stream(state.feed.subscribe(), user.0, state.shutdown.clone()).map(
        |item| match item {
            FeedItem::Change(change) => Event::default().event("change").json_data(change),
            FeedItem::Lagged(missed) => Ok(Event::default().event("lagged").data(missed.to_string())),
        },
    );
    Sse::new(events).keep_alive(KeepAlive::default())
}
