//! # Google Calendar API Handlers
//!
//! OAuth connect flow and access to the user's primary Google calendar.
//! The callback is public: Google redirects the browser there without our
//! bearer token, so the user is recovered from the state nonce instead.

use axum::{
    extract::{Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::{Json, Redirect},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};

use crate::auth::{UserExtension, UserHeader};
use crate::calendar::{GoogleEventList, NewGoogleEvent};
use crate::error::{ApiError, CrmError};
use crate::server::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthorizeResponse {
    /// Google consent page to open in the browser
    pub authorize_url: String,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    /// Set by Google when the user denied access
    pub error: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct GoogleEventsQuery {
    /// Defaults to now
    pub time_min: Option<DateTime<Utc>>,
    /// Defaults to 30 days after now
    pub time_max: Option<DateTime<Utc>>,
}

fn not_configured() -> ApiError {
    ApiError::new(
        StatusCode::SERVICE_UNAVAILABLE,
        "SERVICE_UNAVAILABLE",
        "Google Calendar is not configured",
    )
}

/// Starts the OAuth flow for the calling user
#[utoipa::path(
    get,
    path = "/google-calendar/authorize",
    security(("bearer_auth" = [])),
    params(UserHeader),
    responses(
        (status = 200, description = "Consent URL", body = AuthorizeResponse),
        (status = 503, description = "OAuth client not configured", body = ApiError)
    ),
    tag = "google-calendar"
)]
pub async fn authorize(
    State(state): State<AppState>,
    UserExtension(user): UserExtension,
) -> Result<Json<AuthorizeResponse>, ApiError> {
    if !state.google.is_configured() {
        return Err(not_configured());
    }
    let url = state
        .google
        .begin_authorization(user.0)
        .map_err(CrmError::from)?;
    tracing::info!(user_id = %user.0, "Google Calendar authorization started");
    Ok(Json(AuthorizeResponse {
        authorize_url: url.into(),
    }))
}

/// OAuth redirect target; exchanges the code and sends the browser back to the app
#[utoipa::path(
    get,
    path = "/google-calendar/callback",
    params(CallbackQuery),
    responses(
        (status = 303, description = "Redirect to the calendar page with gcal_connected or gcal_error")
    ),
    tag = "google-calendar"
)]
pub async fn callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Result<Redirect, ApiError> {
    let outcome = match (query.error, query.code, query.state) {
        (Some(error), _, _) => {
            tracing::info!(error = %error, "Google Calendar authorization denied");
            Err(error)
        }
        (None, Some(code), Some(nonce)) => match state.google.take_state(&nonce) {
            Some(user_id) => match state.google.exchange_code(user_id, &code).await {
                Ok(()) => Ok(()),
                Err(err) => {
                    tracing::warn!(user_id = %user_id, error = %err, "Google token exchange failed");
                    Err("token_exchange_failed".to_string())
                }
            },
            None => {
                tracing::warn!("Google callback with unknown or expired state");
                Err("invalid_state".to_string())
            }
        },
        _ => Err("missing_code".to_string()),
    };

    let target = state
        .google
        .return_url(outcome.as_ref().err().map(String::as_str))
        .map_err(CrmError::from)?;
    Ok(Redirect::to(target.as_str()))
}

#[utoipa::path(
    get,
    path = "/google-calendar/events",
    security(("bearer_auth" = [])),
    params(UserHeader, GoogleEventsQuery),
    responses(
        (status = 200, description = "Events, or connected=false when not linked", body = GoogleEventList),
        (status = 502, description = "Google API failure", body = ApiError)
    ),
    tag = "google-calendar"
)]
pub async fn list_events(
    State(state): State<AppState>,
    UserExtension(user): UserExtension,
    Query(query): Query<GoogleEventsQuery>,
) -> Result<Json<GoogleEventList>, ApiError> {
    let events = state
        .google
        .list_events(user.0, query.time_min, query.time_max)
        .await?;
    Ok(Json(events))
}

#[utoipa::path(
    post,
    path = "/google-calendar/events",
    security(("bearer_auth" = [])),
    params(UserHeader),
    request_body = NewGoogleEvent,
    responses(
        (status = 201, description = "Event created on the primary calendar", body = Object),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 401, description = "Google Calendar not connected", body = ApiError)
    ),
    tag = "google-calendar"
)]
pub async fn create_event(
    State(state): State<AppState>,
    UserExtension(user): UserExtension,
    body: Result<Json<NewGoogleEvent>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(event) = body?;
    let created = state.google.create_event(user.0, event).await?;
    Ok((StatusCode::CREATED, Json(created)))
}
