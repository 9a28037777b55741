//! # Pipeline View Handlers
//!
//! Read-only views computed from the user's current leads: the kanban board,
//! the daily follow-up queue, dashboard metrics and the stage catalog.

use axum::{
    extract::{Query, State},
    response::Json,
};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::{UserExtension, UserHeader};
use crate::error::ApiError;
use crate::pipeline::{
    BoardFilter, DashboardSummary, FollowUpQueue, PipelineBoard, Stage, StageColumn, build_queue,
    stages, summarize,
};
use crate::pipeline::derived::LeadView;
use crate::repositories::calendar_event::EventWindow;
use crate::repositories::task::TaskFilter;
use crate::server::AppState;

/// Kanban board response
#[derive(Debug, Serialize, ToSchema)]
pub struct PipelineResponse {
    /// One column per catalog stage, in catalog order
    pub columns: Vec<StageColumn>,
    /// Leads whose stage is not in the catalog
    pub unassigned: Vec<LeadView>,
    /// Non-terminal stages for the progress indicator
    pub progress: Vec<Stage>,
    pub total_leads: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StageInfo {
    #[serde(flatten)]
    pub stage: Stage,
    /// Suggested checklist for leads in this stage
    pub tasks: Vec<&'static str>,
}

#[utoipa::path(
    get,
    path = "/pipeline",
    security(("bearer_auth" = [])),
    params(UserHeader, BoardFilter),
    responses(
        (status = 200, description = "Leads grouped by stage", body = PipelineResponse),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "pipeline"
)]
pub async fn pipeline(
    State(state): State<AppState>,
    UserExtension(user): UserExtension,
    Query(filter): Query<BoardFilter>,
) -> Result<Json<PipelineResponse>, ApiError> {
    let views = state.leads.list_views(user.0).await?;
    let board = PipelineBoard::new(views.into_iter().filter(|view| filter.matches(view)));
    let grouped = board.columns(stages::catalog());
    let total_leads = grouped.lead_count();

    Ok(Json(PipelineResponse {
        columns: grouped.columns,
        unassigned: grouped.unassigned,
        progress: stages::progress_stages().copied().collect(),
        total_leads,
    }))
}

/// Today's follow-up queue
#[utoipa::path(
    get,
    path = "/follow-ups",
    security(("bearer_auth" = [])),
    params(UserHeader),
    responses(
        (status = 200, description = "Pending and completed follow-ups", body = FollowUpQueue),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "pipeline"
)]
pub async fn follow_ups(
    State(state): State<AppState>,
    UserExtension(user): UserExtension,
) -> Result<Json<FollowUpQueue>, ApiError> {
    let views = state.leads.list_views(user.0).await?;
    Ok(Json(build_queue(views)))
}

#[utoipa::path(
    get,
    path = "/dashboard",
    security(("bearer_auth" = [])),
    params(UserHeader),
    responses(
        (status = 200, description = "Pipeline metrics", body = DashboardSummary),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "pipeline"
)]
pub async fn dashboard(
    State(state): State<AppState>,
    UserExtension(user): UserExtension,
) -> Result<Json<DashboardSummary>, ApiError> {
    let task_filter = TaskFilter::default();
    let window = EventWindow::default();
    let (views, tasks, events) = tokio::try_join!(
        state.leads.list_views(user.0),
        state.tasks.list(user.0, &task_filter),
        state.events.list(user.0, &window),
    )?;

    Ok(Json(summarize(
        &views,
        &tasks,
        &events,
        Utc::now(),
        state.offset(),
    )))
}

/// The ordered stage catalog with suggested tasks
#[utoipa::path(
    get,
    path = "/stages",
    security(("bearer_auth" = [])),
    params(UserHeader),
    responses(
        (status = 200, description = "Stage catalog", body = [StageInfo])
    ),
    tag = "pipeline"
)]
pub async fn stages(_user: UserExtension) -> Json<Vec<StageInfo>> {
    Json(
        stages::catalog()
            .iter()
            .map(|stage| StageInfo {
                stage: *stage,
                tasks: stages::stage_tasks(stage.id).to_vec(),
            })
            .collect(),
    )
}
