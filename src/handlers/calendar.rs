//! # Calendar API Handlers
//!
//! Locally stored events and the month grid that mixes them with lead
//! milestones and dated tasks.

use axum::{
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::Json,
};
use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::{UserExtension, UserHeader};
use crate::calendar::{CalendarDay, GridEvent, collect_events, month_grid as build_grid, upcoming};
use crate::error::ApiError;
use crate::models::calendar_event;
use crate::pipeline::derived::local_today;
use crate::repositories::calendar_event::{EventWindow, NewCalendarEvent};
use crate::repositories::task::TaskFilter;
use crate::server::AppState;

const UPCOMING_DAYS: i64 = 7;

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct GridQuery {
    /// Defaults to the current local year
    pub year: Option<i32>,
    /// 1-12; defaults to the current local month
    pub month: Option<u32>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MonthGridResponse {
    pub year: i32,
    pub month: u32,
    /// 42 cells, weeks starting Monday
    pub days: Vec<CalendarDay>,
    /// Open items in the next seven days
    pub upcoming: Vec<GridEvent>,
}

#[utoipa::path(
    get,
    path = "/calendar/events",
    security(("bearer_auth" = [])),
    params(UserHeader, EventWindow),
    responses(
        (status = 200, description = "Stored events by start time", body = [calendar_event::Model])
    ),
    tag = "calendar"
)]
pub async fn list_events(
    State(state): State<AppState>,
    UserExtension(user): UserExtension,
    Query(window): Query<EventWindow>,
) -> Result<Json<Vec<calendar_event::Model>>, ApiError> {
    Ok(Json(state.events.list(user.0, &window).await?))
}

#[utoipa::path(
    post,
    path = "/calendar/events",
    security(("bearer_auth" = [])),
    params(UserHeader),
    request_body = NewCalendarEvent,
    responses(
        (status = 201, description = "Event stored", body = calendar_event::Model),
        (status = 400, description = "Validation error", body = ApiError)
    ),
    tag = "calendar"
)]
pub async fn create_event(
    State(state): State<AppState>,
    UserExtension(user): UserExtension,
    body: Result<Json<NewCalendarEvent>, JsonRejection>,
) -> Result<(StatusCode, Json<calendar_event::Model>), ApiError> {
    let Json(new) = body?;
    let event = state.events.create(user.0, new).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

#[utoipa::path(
    delete,
    path = "/calendar/events/{id}",
    security(("bearer_auth" = [])),
    params(UserHeader, ("id" = Uuid, Path, description = "Event id")),
    responses(
        (status = 204, description = "Event deleted"),
        (status = 404, description = "Event not found", body = ApiError)
    ),
    tag = "calendar"
)]
pub async fn delete_event(
    State(state): State<AppState>,
    UserExtension(user): UserExtension,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.events.delete(user.0, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Month view with lead milestones, dated tasks and stored events
#[utoipa::path(
    get,
    path = "/calendar/grid",
    security(("bearer_auth" = [])),
    params(UserHeader, GridQuery),
    responses(
        (status = 200, description = "Month grid", body = MonthGridResponse),
        (status = 400, description = "Invalid month", body = ApiError)
    ),
    tag = "calendar"
)]
pub async fn month_grid(
    State(state): State<AppState>,
    UserExtension(user): UserExtension,
    Query(query): Query<GridQuery>,
) -> Result<Json<MonthGridResponse>, ApiError> {
    let offset = state.offset();
    let today = local_today(Utc::now(), offset);
    let year = query.year.unwrap_or_else(|| today.year());
    let month = query.month.unwrap_or_else(|| today.month());

    let task_filter = TaskFilter::default();
    let window = EventWindow::default();
    let (leads, tasks, stored) = tokio::try_join!(
        state.leads.list(user.0),
        state.tasks.list(user.0, &task_filter),
        state.events.list(user.0, &window),
    )?;
    let events = collect_events(&leads, &tasks, &stored, offset);
    let days = build_grid(year, month, today, &events)?;

    Ok(Json(MonthGridResponse {
        year,
        month,
        days,
        upcoming: upcoming(&events, today, UPCOMING_DAYS),
    }))
}
