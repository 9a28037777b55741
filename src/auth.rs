//! # Authentication
//!
//! Bearer token validation and owner identification for protected endpoints.
//! Every authenticated request carries an `X-User-Id` header naming the user
//! whose records it may touch; repositories scope all queries by that id.

use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts, Request, State},
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{ApiError, unauthorized, validation_error};
use crate::server::AppState;

pub const USER_ID_HEADER: &str = "X-User-Id";

/// Owning user id
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct UserId(pub Uuid);

/// Marker inserted once the bearer token has been accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BearerAuth;

/// Extractor for the authenticated user
#[derive(Debug, Clone, Copy)]
pub struct UserExtension(pub UserId);

impl UserExtension {
    pub fn id(&self) -> Uuid {
        self.0.0
    }
}

impl FromRef<AppState> for Arc<AppConfig> {
    fn from_ref(app_state: &AppState) -> Self {
        Arc::clone(&app_state.config)
    }
}

/// Validates the bearer token and the `X-User-Id` header.
pub async fn auth_middleware(
    State(config): State<Arc<AppConfig>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let headers = request.headers();

    let token = extract_bearer_token(headers)?;
    validate_token(&config, token)?;

    let user = extract_user_id(headers)?;
    tracing::debug!(user_id = %user.0, "Authenticated request");

    request.extensions_mut().insert(UserExtension(user));
    request.extensions_mut().insert(BearerAuth);

    Ok(next.run(request).await)
}

fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let header = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| unauthorized(Some("Missing Authorization header")))?
        .to_str()
        .map_err(|_| unauthorized(Some("Invalid Authorization header")))?;

    header
        .strip_prefix("Bearer ")
        .ok_or_else(|| unauthorized(Some("Authorization header must use Bearer scheme")))
}

fn validate_token(config: &AppConfig, token: &str) -> Result<(), ApiError> {
    let is_valid = config
        .api_tokens
        .iter()
        .any(|configured| ConstantTimeEq::ct_eq(token.as_bytes(), configured.as_bytes()).into());

    if is_valid {
        Ok(())
    } else {
        Err(unauthorized(Some("Invalid bearer token")))
    }
}

fn extract_user_id(headers: &HeaderMap) -> Result<UserId, ApiError> {
    let header_value = headers
        .get(USER_ID_HEADER)
        .ok_or_else(|| {
            validation_error(
                "Missing required header",
                serde_json::json!({ USER_ID_HEADER: "Required header is missing" }),
            )
        })?
        .to_str()
        .map_err(|_| {
            validation_error(
                "Invalid user header",
                serde_json::json!({ USER_ID_HEADER: "Header must be valid UTF-8" }),
            )
        })?;

    header_value.trim().parse::<Uuid>().map(UserId).map_err(|_| {
        validation_error(
            "Invalid user ID",
            serde_json::json!({ USER_ID_HEADER: "Must be a valid UUID" }),
        )
    })
}

/// OpenAPI header parameter for X-User-Id
#[derive(Debug, Serialize, Deserialize, IntoParams, utoipa::ToSchema)]
#[into_params(parameter_in = Header)]
pub struct UserHeader {
    /// Owner of the records the request operates on (UUID)
    #[serde(rename = "X-User-Id")]
    #[param(rename = "X-User-Id", value_type = String)]
    pub user_id: String,
}

impl<S> FromRequestParts<S> for UserExtension
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<UserExtension>()
            .copied()
            .ok_or_else(|| unauthorized(Some("User context missing")))
    }
}

impl<S> FromRequestParts<S> for BearerAuth
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<BearerAuth>()
            .copied()
            .ok_or_else(|| unauthorized(Some("Authentication required")))
    }
}
