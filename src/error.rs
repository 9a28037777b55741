//! # Error Handling
//!
//! Domain errors ([`CrmError`]) raised by the stores and services, and the
//! problem+json [`ApiError`] they are rendered as at the HTTP edge.

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::telemetry;

/// Errors raised by CRM operations.
#[derive(Debug, Error)]
pub enum CrmError {
    /// Input failed validation (missing required field, unknown stage, negative amount).
    #[error("{message}")]
    Validation {
        field: Option<&'static str>,
        message: String,
    },
    /// Operation on an id that does not exist for the calling user.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },
    /// No authenticated session, or a third-party authorization is missing.
    #[error("{0}")]
    Auth(String),
    /// The record is not in a state that allows the operation.
    #[error("{0}")]
    Precondition(String),
    /// A backend or third-party call failed or timed out.
    #[error("{service} request failed: {message}")]
    ExternalService {
        service: &'static str,
        message: String,
    },
    #[error(transparent)]
    Database(#[from] sea_orm::DbErr),
}

impl CrmError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field: Some(field),
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn external(service: &'static str, message: impl ToString) -> Self {
        Self::ExternalService {
            service,
            message: message.to_string(),
        }
    }
}

/// Unified API error response structure
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiError {
    /// HTTP status code for the response
    #[serde(skip_serializing, skip_deserializing)]
    pub status: StatusCode,
    /// Error code for programmatic handling
    pub code: Box<str>,
    /// Human-readable error message
    pub message: Box<str>,
    /// Additional error details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Box<serde_json::Value>>,
    /// Correlation trace ID for debugging (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<Box<str>>,
}

impl ApiError {
    /// Create a new API error with the given status code and message
    pub fn new<S: Into<String>>(status: StatusCode, code: S, message: S) -> Self {
        Self {
            status,
            code: code.into().into_boxed_str(),
            message: message.into().into_boxed_str(),
            details: None,
            trace_id: Self::current_trace_id(),
        }
    }

    /// Add details to the error
    pub fn with_details<V: Into<serde_json::Value>>(mut self, details: V) -> Self {
        self.details = Some(Box::new(details.into()));
        self
    }

    /// Extract the request trace ID, falling back to a short correlation ID
    fn current_trace_id() -> Option<Box<str>> {
        telemetry::current_trace_id()
            .map(|trace_id| trace_id.into_boxed_str())
            .or_else(|| {
                Some(format!("corr-{}", &Uuid::new_v4().simple().to_string()[..8]).into_boxed_str())
            })
    }
}

fn is_unique_violation(error: &sea_orm::DbErr) -> bool {
    use sea_orm::RuntimeErr;

    let runtime_err = match error {
        sea_orm::DbErr::Query(RuntimeErr::SqlxError(sqlx_err))
        | sea_orm::DbErr::Exec(RuntimeErr::SqlxError(sqlx_err)) => sqlx_err,
        _ => return false,
    };

    runtime_err
        .as_database_error()
        .is_some_and(|db_error| db_error.is_unique_violation())
}

/// Standard error types with predefined status codes
#[derive(Debug, Error)]
pub enum ErrorType {
    #[error("Bad Request")]
    BadRequest,
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Not Found")]
    NotFound,
    #[error("Conflict")]
    Conflict,
    #[error("Precondition Failed")]
    PreconditionFailed,
    #[error("Internal Server Error")]
    InternalServerError,
    #[error("Bad Gateway")]
    BadGateway,
    #[error("Service Unavailable")]
    ServiceUnavailable,
}

impl ErrorType {
    /// Get the appropriate HTTP status code for this error type
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorType::BadRequest => StatusCode::BAD_REQUEST,
            ErrorType::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorType::NotFound => StatusCode::NOT_FOUND,
            ErrorType::Conflict => StatusCode::CONFLICT,
            ErrorType::PreconditionFailed => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorType::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorType::BadGateway => StatusCode::BAD_GATEWAY,
            ErrorType::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Get the SCREAMING_SNAKE_CASE error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            ErrorType::BadRequest => "VALIDATION_FAILED",
            ErrorType::Unauthorized => "UNAUTHORIZED",
            ErrorType::NotFound => "NOT_FOUND",
            ErrorType::Conflict => "CONFLICT",
            ErrorType::PreconditionFailed => "PRECONDITION_FAILED",
            ErrorType::InternalServerError => "INTERNAL_SERVER_ERROR",
            ErrorType::BadGateway => "EXTERNAL_SERVICE_ERROR",
            ErrorType::ServiceUnavailable => "SERVICE_UNAVAILABLE",
        }
    }

    fn with_message(&self, message: &str) -> ApiError {
        ApiError::new(self.status_code(), self.error_code(), message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-type",
            HeaderValue::from_static("application/problem+json"),
        );

        (self.status, headers, axum::Json(self)).into_response()
    }
}

impl From<ErrorType> for ApiError {
    fn from(error_type: ErrorType) -> Self {
        error_type.with_message(&error_type.to_string())
    }
}

impl From<CrmError> for ApiError {
    fn from(error: CrmError) -> Self {
        match error {
            CrmError::Validation { field, message } => {
                let api = ErrorType::BadRequest.with_message(&message);
                match field {
                    Some(field) => api.with_details(json!({ field: message })),
                    None => api,
                }
            }
            CrmError::NotFound { entity, id } => ErrorType::NotFound
                .with_message(&format!("{} not found", entity))
                .with_details(json!({ "id": id })),
            CrmError::Auth(message) => ErrorType::Unauthorized.with_message(&message),
            CrmError::Precondition(message) => {
                ErrorType::PreconditionFailed.with_message(&message)
            }
            CrmError::ExternalService { service, message } => {
                tracing::warn!(service, error = %message, "External service call failed");
                ErrorType::BadGateway
                    .with_message(&format!("{} is unavailable", service))
                    .with_details(json!({ "service": service }))
            }
            CrmError::Database(db) => db.into(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        tracing::error!("Internal error: {:?}", error);
        ErrorType::InternalServerError.with_message("An internal error occurred")
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let message = match rejection {
            JsonRejection::JsonDataError(err) => format!("Invalid JSON: {}", err),
            JsonRejection::JsonSyntaxError(err) => format!("JSON syntax error: {}", err),
            JsonRejection::MissingJsonContentType(_) => {
                "Missing 'Content-Type: application/json' header".to_string()
            }
            _ => "Invalid request body".to_string(),
        };

        ErrorType::BadRequest.with_message(&message)
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ErrorType::BadRequest.with_message(&format!("Invalid query string: {}", rejection))
    }
}

impl From<sea_orm::DbErr> for ApiError {
    fn from(error: sea_orm::DbErr) -> Self {
        if is_unique_violation(&error) {
            tracing::debug!(?error, "Unique constraint violation detected");
            return ErrorType::Conflict.with_message("Resource already exists");
        }

        match error {
            sea_orm::DbErr::RecordNotFound(record) => {
                ErrorType::NotFound.with_message(&format!("Record not found: {}", record))
            }
            sea_orm::DbErr::Conn(connection_err) => {
                tracing::error!("Database connection error: {:?}", connection_err);
                ErrorType::ServiceUnavailable.with_message("Database service unavailable")
            }
            other => {
                tracing::error!("Database error: {:?}", other);
                ErrorType::InternalServerError.with_message("Database error occurred")
            }
        }
    }
}

/// Create an unauthorized error (401)
pub fn unauthorized(message: Option<&str>) -> ApiError {
    let msg = message.unwrap_or("Authentication required");
    ErrorType::Unauthorized.with_message(msg)
}

/// Create a validation error with field details
pub fn validation_error(message: &str, field_errors: serde_json::Value) -> ApiError {
    ErrorType::BadRequest
        .with_message(message)
        .with_details(field_errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_basic() {
        let error = ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "Test error message",
        );

        assert_eq!(error.code, Box::from("VALIDATION_FAILED"));
        assert_eq!(error.message, Box::from("Test error message"));
        assert_eq!(error.details, None);
    }

    #[test]
    fn test_trace_id_fallback_format() {
        let error = ApiError::from(ErrorType::InternalServerError);
        let trace_id = error.trace_id.unwrap();
        assert!(trace_id.starts_with("corr-"));
        assert_eq!(trace_id.len(), 13);
    }

    #[test]
    fn test_crm_error_status_mapping() {
        let cases = [
            (
                CrmError::validation("business_name", "business_name is required"),
                StatusCode::BAD_REQUEST,
                "VALIDATION_FAILED",
            ),
            (
                CrmError::not_found("lead", Uuid::new_v4()),
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
            ),
            (
                CrmError::Auth("no session".into()),
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
            ),
            (
                CrmError::Precondition("lead has no phone number".into()),
                StatusCode::UNPROCESSABLE_ENTITY,
                "PRECONDITION_FAILED",
            ),
            (
                CrmError::external("google_calendar", "timeout"),
                StatusCode::BAD_GATEWAY,
                "EXTERNAL_SERVICE_ERROR",
            ),
        ];

        for (error, status, code) in cases {
            let api: ApiError = error.into();
            assert_eq!(api.status, status);
            assert_eq!(api.code.as_ref(), code);
        }
    }

    #[test]
    fn test_validation_error_carries_field_details() {
        let api: ApiError = CrmError::validation("business_name", "required").into();
        let details = api.details.unwrap();
        assert_eq!(details["business_name"], "required");
    }

    #[test]
    fn test_external_error_hides_upstream_message() {
        let api: ApiError = CrmError::external("investigation", "connection refused 10.0.0.4").into();
        assert!(!api.message.contains("10.0.0.4"));
        assert_eq!(api.details.unwrap()["service"], "investigation");
    }

    #[test]
    fn test_database_error_mapping() {
        let api: ApiError = CrmError::Database(sea_orm::DbErr::RecordNotFound("lead".into())).into();
        assert_eq!(api.status, StatusCode::NOT_FOUND);

        let api: ApiError = sea_orm::DbErr::Conn(sea_orm::RuntimeErr::Internal("down".into())).into();
        assert_eq!(api.status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_content_type_header() {
        let response = unauthorized(None).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/problem+json"
        );
    }

    #[test]
    fn test_from_anyhow_is_opaque() {
        let api: ApiError = anyhow::anyhow!("secret internals").into();
        assert_eq!(api.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!api.message.contains("secret"));
    }
}
