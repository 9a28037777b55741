//! Webhook configuration repository

use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::Deserialize;
use url::Url;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::CrmError;
use crate::models::webhook_config::{self, Entity as WebhookConfig};
use crate::webhook_dispatch::WebhookEvent;

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewWebhookConfig {
    pub url: String,
    pub events: Vec<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

impl NewWebhookConfig {
    /// Normalized URL and de-duplicated event names.
    fn validate(&self) -> Result<(String, Vec<String>), CrmError> {
        let url = Url::parse(self.url.trim())
            .map_err(|e| CrmError::validation("url", format!("invalid url: {}", e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(CrmError::validation("url", "url must use http or https"));
        }

        if self.events.is_empty() {
            return Err(CrmError::validation("events", "at least one event is required"));
        }
        let mut events: Vec<String> = Vec::with_capacity(self.events.len());
        for name in &self.events {
            let event = WebhookEvent::from_name(name.trim()).ok_or_else(|| {
                CrmError::validation("events", format!("unknown event '{}'", name))
            })?;
            let name = event.as_str().to_string();
            if !events.contains(&name) {
                events.push(name);
            }
        }

        Ok((url.to_string(), events))
    }
}

#[derive(Debug, Clone)]
pub struct WebhookConfigRepository {
    db: Arc<DatabaseConnection>,
}

impl WebhookConfigRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn create(
        &self,
        user_id: Uuid,
        new: NewWebhookConfig,
    ) -> Result<webhook_config::Model, CrmError> {
        let (url, events) = new.validate()?;

        let model = webhook_config::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            url: Set(url),
            events: Set(serde_json::json!(events)),
            active: Set(new.active),
            created_at: Set(Utc::now().into()),
        }
        .insert(self.db.as_ref())
        .await?;

        tracing::info!(webhook_id = %model.id, user_id = %user_id, "Registered webhook");
        Ok(model)
    }

    pub async fn list(&self, user_id: Uuid) -> Result<Vec<webhook_config::Model>, CrmError> {
        let configs = WebhookConfig::find()
            .filter(webhook_config::Column::UserId.eq(user_id))
            .order_by_desc(webhook_config::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?;
        Ok(configs)
    }

    /// Active configs of the user subscribed to `event`.
    pub async fn subscribers(
        &self,
        user_id: Uuid,
        event: &str,
    ) -> Result<Vec<webhook_config::Model>, CrmError> {
        let configs = WebhookConfig::find()
            .filter(webhook_config::Column::UserId.eq(user_id))
            .filter(webhook_config::Column::Active.eq(true))
            .all(self.db.as_ref())
            .await?;
        Ok(configs
            .into_iter()
            .filter(|config| config.subscribes_to(event))
            .collect())
    }

    pub async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<(), CrmError> {
        let result = WebhookConfig::delete_many()
            .filter(webhook_config::Column::Id.eq(id))
            .filter(webhook_config::Column::UserId.eq(user_id))
            .exec(self.db.as_ref())
            .await?;
        if result.rows_affected == 0 {
            return Err(CrmError::not_found("webhook", id));
        }
        Ok(())
    }
}
