//! # Message Template Handlers

use axum::{
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::{UserExtension, UserHeader};
use crate::error::ApiError;
use crate::models::message_template;
use crate::repositories::message_template::{NewTemplate, TemplatePatch};
use crate::server::AppState;
use crate::templates::{self, CATEGORIES, TemplateCategory};

#[derive(Debug, Serialize, ToSchema)]
pub struct TemplatesResponse {
    pub templates: Vec<message_template::Model>,
    pub categories: Vec<TemplateCategory>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RenderQuery {
    /// Lead whose fields fill the placeholders
    pub lead_id: Uuid,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RenderedTemplate {
    pub text: String,
    /// Placeholder names found in the template, in order
    pub variables: Vec<String>,
    /// wa.me link prefilled with `text`; absent when the lead has no phone
    pub whatsapp_url: Option<String>,
}

#[utoipa::path(
    get,
    path = "/templates",
    security(("bearer_auth" = [])),
    params(UserHeader),
    responses(
        (status = 200, description = "Templates by category", body = TemplatesResponse)
    ),
    tag = "templates"
)]
pub async fn list_templates(
    State(state): State<AppState>,
    UserExtension(user): UserExtension,
) -> Result<Json<TemplatesResponse>, ApiError> {
    let templates = state.templates.list(user.0).await?;
    Ok(Json(TemplatesResponse {
        templates,
        categories: CATEGORIES.to_vec(),
    }))
}

#[utoipa::path(
    post,
    path = "/templates",
    security(("bearer_auth" = [])),
    params(UserHeader),
    request_body = NewTemplate,
    responses(
        (status = 201, description = "Template created", body = message_template::Model),
        (status = 400, description = "Validation error", body = ApiError)
    ),
    tag = "templates"
)]
pub async fn create_template(
    State(state): State<AppState>,
    UserExtension(user): UserExtension,
    body: Result<Json<NewTemplate>, JsonRejection>,
) -> Result<(StatusCode, Json<message_template::Model>), ApiError> {
    let Json(new) = body?;
    let template = state.templates.create(user.0, new).await?;
    Ok((StatusCode::CREATED, Json(template)))
}

/// Adds the built-in templates to the user's set
#[utoipa::path(
    post,
    path = "/templates/defaults",
    security(("bearer_auth" = [])),
    params(UserHeader),
    responses(
        (status = 201, description = "Default templates created", body = [message_template::Model])
    ),
    tag = "templates"
)]
pub async fn seed_default_templates(
    State(state): State<AppState>,
    UserExtension(user): UserExtension,
) -> Result<(StatusCode, Json<Vec<message_template::Model>>), ApiError> {
    let created = state.templates.seed_defaults(user.0).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    patch,
    path = "/templates/{id}",
    security(("bearer_auth" = [])),
    params(UserHeader, ("id" = Uuid, Path, description = "Template id")),
    request_body = TemplatePatch,
    responses(
        (status = 200, description = "Updated template", body = message_template::Model),
        (status = 404, description = "Template not found", body = ApiError)
    ),
    tag = "templates"
)]
pub async fn update_template(
    State(state): State<AppState>,
    UserExtension(user): UserExtension,
    Path(id): Path<Uuid>,
    body: Result<Json<TemplatePatch>, JsonRejection>,
) -> Result<Json<message_template::Model>, ApiError> {
    let Json(patch) = body?;
    Ok(Json(state.templates.update(user.0, id, patch).await?))
}

#[utoipa::path(
    delete,
    path = "/templates/{id}",
    security(("bearer_auth" = [])),
    params(UserHeader, ("id" = Uuid, Path, description = "Template id")),
    responses(
        (status = 204, description = "Template deleted"),
        (status = 404, description = "Template not found", body = ApiError)
    ),
    tag = "templates"
)]
pub async fn delete_template(
    State(state): State<AppState>,
    UserExtension(user): UserExtension,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.templates.delete(user.0, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Fills a template for one lead at the current local time
#[utoipa::path(
    get,
    path = "/templates/{id}/render",
    security(("bearer_auth" = [])),
    params(UserHeader, ("id" = Uuid, Path, description = "Template id"), RenderQuery),
    responses(
        (status = 200, description = "Rendered text", body = RenderedTemplate),
        (status = 404, description = "Template or lead not found", body = ApiError)
    ),
    tag = "templates"
)]
pub async fn render_template(
    State(state): State<AppState>,
    UserExtension(user): UserExtension,
    Path(id): Path<Uuid>,
    Query(query): Query<RenderQuery>,
) -> Result<Json<RenderedTemplate>, ApiError> {
    let (template, lead) = tokio::try_join!(
        state.templates.get(user.0, id),
        state.leads.get(user.0, query.lead_id),
    )?;

    let now = Utc::now().with_timezone(&state.offset());
    let text = templates::render(&template.content, &lead, now);
    let whatsapp_url = templates::whatsapp_link(&lead, &text);

    Ok(Json(RenderedTemplate {
        variables: templates::variables(&template.content),
        text,
        whatsapp_url,
    }))
}
