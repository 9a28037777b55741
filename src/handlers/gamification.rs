//! # Gamification Handler

use axum::{extract::State, response::Json};
use chrono::Utc;

use crate::auth::{UserExtension, UserHeader};
use crate::error::ApiError;
use crate::gamification::{self, GamificationProfile};
use crate::pipeline::derived::local_today;
use crate::repositories::task::TaskFilter;
use crate::server::AppState;

/// XP, level, badges and achievements computed from current activity
#[utoipa::path(
    get,
    path = "/gamification",
    security(("bearer_auth" = [])),
    params(UserHeader),
    responses(
        (status = 200, description = "Sales profile", body = GamificationProfile),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "gamification"
)]
pub async fn profile(
    State(state): State<AppState>,
    UserExtension(user): UserExtension,
) -> Result<Json<GamificationProfile>, ApiError> {
    let task_filter = TaskFilter::default();
    let (leads, tasks) = tokio::try_join!(
        state.leads.list(user.0),
        state.tasks.list(user.0, &task_filter),
    )?;
    let today = local_today(Utc::now(), state.offset());
    Ok(Json(gamification::profile(&leads, &tasks, today)))
}
