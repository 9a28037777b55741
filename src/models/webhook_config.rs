//! Webhook configuration entity model
//!
//! A subscriber endpoint that receives `{event, payload, timestamp}` POSTs for the
//! event names it lists.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[schema(as = WebhookConfig)]
#[sea_orm(table_name = "webhook_configs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(indexed)]
    pub user_id: Uuid,
    #[sea_orm(column_type = "Text")]
    pub url: String,
    /// JSON array of subscribed event names
    #[sea_orm(column_type = "JsonBinary")]
    #[schema(value_type = Object)]
    pub events: Json,
    pub active: bool,
    #[schema(value_type = String, format = DateTime)]
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Event names this endpoint subscribes to. Non-string entries are ignored.
    pub fn event_names(&self) -> Vec<&str> {
        self.events
            .as_array()
            .map(|values| values.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default()
    }

    pub fn subscribes_to(&self, event: &str) -> bool {
        self.event_names().contains(&event)
    }
}
